//! Query Bot - Entry Point
//!
//! Loads configuration, builds the NLU and knowledge clients, and either
//! serves Slack commands over Socket Mode or answers a single question
//! from the command line.

use clap::{Parser, Subcommand};
use query_bot::app::{build_dispatcher, build_handler};
use query_bot::command::StdoutReply;
use query_bot::core::config::BotConfig;
use query_bot::core::error::Result;
use query_bot::core::types::IncomingQuery;
use query_bot::slack::{SlackApi, SocketModeListener};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Slack bot that answers questions through Wit.ai and Wolfram|Alpha
#[derive(Parser, Debug)]
#[command(name = "query-bot")]
#[command(about = "Answer natural language questions in Slack")]
struct Args {
    /// TOML config file (defaults to $QUERY_BOT_CONFIG if set)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Listen for Slack commands (default)
    Serve,
    /// Answer one question and print the reply
    Ask {
        /// The question, e.g. "What are the Colors of the Rainbow?"
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("query_bot=info")),
        )
        .init();

    let args = Args::parse();
    let config = BotConfig::load(args.config.as_deref()).map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Ask { question } => ask(config, question.join(" ")).await,
    }
}

async fn serve(config: BotConfig) -> Result<()> {
    config.require_all()?;
    tracing::info!("Query bot starting...");

    let api = Arc::new(SlackApi::new(
        config.slack_bot_token.clone(),
        config.slack_app_token.clone(),
    ));
    let bot_user_id = api.bot_user_id().await.map_err(|e| {
        tracing::error!("Slack auth.test failed: {}", e);
        e
    })?;
    tracing::info!("Authenticated as {}", bot_user_id);

    let (dispatcher, _logger) = build_dispatcher(&config, build_handler(&config));
    let listener = SocketModeListener::new(api, Arc::new(dispatcher)).with_bot_user_id(bot_user_id);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    listener.run(shutdown_rx).await.map_err(|e| {
        tracing::error!("Slack listener failed: {}", e);
        e
    })
}

async fn ask(config: BotConfig, question: String) -> Result<()> {
    config.require_backends()?;
    let handler = build_handler(&config);
    let outcome = handler.handle(IncomingQuery::new(question), &StdoutReply).await;
    tracing::debug!("Outcome: {:?}", outcome);
    Ok(())
}
