//! Query handling - the per-command pipeline
//!
//! IncomingQuery -> EntityExtractor -> ParsedEntity -> AnswerResolver -> Answer -> ReplySink
//!
//! Every invocation writes exactly one reply. Backend failures turn into
//! one of two fixed messages and never escape the handler.

use crate::command::reply::ReplySink;
use crate::core::config::BotConfig;
use crate::core::types::IncomingQuery;
use crate::knowledge::AnswerResolver;
use crate::nlu::EntityExtractor;
use std::sync::Arc;

/// Fixed user-facing failure replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessages {
    /// Sent when no entity could be extracted
    pub not_understood: String,
    /// Sent when the knowledge backend had no answer
    pub no_answer: String,
}

impl Default for FailureMessages {
    fn default() -> Self {
        let config = BotConfig::default();
        Self::from_config(&config)
    }
}

impl FailureMessages {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            not_understood: config.not_understood_message.clone(),
            no_answer: config.no_answer_message.clone(),
        }
    }
}

/// How a handled query ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The answer text was sent
    Answered,
    /// The NLU backend produced no usable entity; the resolver was skipped
    NotUnderstood,
    /// The knowledge backend failed, timed out, or had no answer
    NoAnswer,
}

/// Runs the extract -> resolve -> reply pipeline
///
/// Holds no per-request state, so one handler can serve any number of
/// concurrent invocations.
#[derive(Clone)]
pub struct QueryHandler {
    extractor: Arc<dyn EntityExtractor>,
    resolver: Arc<dyn AnswerResolver>,
    messages: FailureMessages,
}

impl QueryHandler {
    pub fn new(
        extractor: Arc<dyn EntityExtractor>,
        resolver: Arc<dyn AnswerResolver>,
        messages: FailureMessages,
    ) -> Self {
        Self {
            extractor,
            resolver,
            messages,
        }
    }

    pub fn messages(&self) -> &FailureMessages {
        &self.messages
    }

    /// Handle one query, writing exactly one reply to `reply`
    pub async fn handle(&self, query: IncomingQuery, reply: &dyn ReplySink) -> Outcome {
        let (outcome, text) = self.run(&query).await;
        tracing::debug!("Query {:?} finished as {:?}", query.text, outcome);

        if let Err(e) = reply.reply(&text).await {
            tracing::warn!("Failed to send reply: {}", e);
        }
        outcome
    }

    async fn run(&self, query: &IncomingQuery) -> (Outcome, String) {
        let entity = self.extractor.extract(&query.text).await;
        if !entity.found {
            return (Outcome::NotUnderstood, self.messages.not_understood.clone());
        }

        let answer = self.resolver.resolve(&entity.value).await;
        if !answer.ok {
            return (Outcome::NoAnswer, self.messages.no_answer.clone());
        }

        (Outcome::Answered, answer.text)
    }
}
