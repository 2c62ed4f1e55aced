//! Resolve an entity value into a short answer within a fixed time bound

use crate::core::types::{Answer, UnitSystem};
use crate::knowledge::client::KnowledgeBackend;
use async_trait::async_trait;
use std::time::Duration;

/// Turns a query string into an answer
#[async_trait]
pub trait AnswerResolver: Send + Sync {
    /// Never fails: errors and timeouts come back as `ok = false`
    async fn resolve(&self, query: &str) -> Answer;
}

/// Answer resolver backed by a [`KnowledgeBackend`]
///
/// The query is forwarded unmodified, including the empty string.
pub struct SpokenAnswerResolver<B> {
    backend: B,
    units: UnitSystem,
    timeout: Duration,
}

impl<B: KnowledgeBackend> SpokenAnswerResolver<B> {
    pub fn new(backend: B, units: UnitSystem, timeout: Duration) -> Self {
        Self {
            backend,
            units,
            timeout,
        }
    }
}

#[async_trait]
impl<B: KnowledgeBackend> AnswerResolver for SpokenAnswerResolver<B> {
    async fn resolve(&self, query: &str) -> Answer {
        // The backend also gets the bound, but it may not honor it.
        let call = self.backend.spoken_answer(query, self.units, self.timeout);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => Answer::ok(text),
            Ok(Err(e)) => {
                tracing::warn!("Knowledge request failed: {}", e);
                Answer::failed()
            }
            Err(_) => {
                tracing::warn!(
                    "Knowledge request timed out after {} ms",
                    self.timeout.as_millis()
                );
                Answer::failed()
            }
        }
    }
}
