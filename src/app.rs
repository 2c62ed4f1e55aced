//! Wiring - builds the pipeline from configuration

use crate::command::{
    spawn_event_logger, ChannelObserver, CommandDispatcher, FailureMessages, QueryHandler,
};
use crate::core::config::BotConfig;
use crate::knowledge::{SpokenAnswerResolver, WolframClient};
use crate::nlu::{WitClient, WitEntityExtractor};
use reqwest::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Build a query handler talking to Wit.ai and Wolfram|Alpha
///
/// Both backends share one connection pool.
pub fn build_handler(config: &BotConfig) -> QueryHandler {
    let http = Client::new();

    let wit = WitClient::new(
        config.wit_token.clone(),
        config.wit_base_url.clone(),
        config.wit_api_version.clone(),
    )
    .with_client(http.clone());
    let extractor = WitEntityExtractor::new(wit, config.wit_entity_key.clone());

    let wolfram = WolframClient::new(config.wolfram_app_id.clone(), config.wolfram_base_url.clone())
        .with_client(http);
    let resolver = SpokenAnswerResolver::new(wolfram, config.units, config.answer_timeout());

    QueryHandler::new(
        Arc::new(extractor),
        Arc::new(resolver),
        FailureMessages::from_config(config),
    )
}

/// Build the command dispatcher, plus the telemetry drain task if enabled
pub fn build_dispatcher(
    config: &BotConfig,
    handler: QueryHandler,
) -> (CommandDispatcher, Option<JoinHandle<()>>) {
    let dispatcher = CommandDispatcher::new(config.command_keyword.clone(), handler);

    if !config.telemetry {
        return (dispatcher, None);
    }

    let (observer, rx) = ChannelObserver::channel(config.telemetry_buffer);
    let logger = spawn_event_logger(rx);
    (dispatcher.with_observer(Arc::new(observer)), Some(logger))
}
