//! Async Wolfram|Alpha client for the spoken results API
//!
//! The spoken results endpoint answers with a single plain-text sentence,
//! or HTTP 501 when it has nothing to say.

use crate::core::error::{BotError, Result};
use crate::core::types::UnitSystem;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// A backend that answers a query with short text
#[async_trait]
pub trait KnowledgeBackend: Send + Sync {
    /// Ask for a short answer, giving up after `timeout`
    async fn spoken_answer(
        &self,
        query: &str,
        units: UnitSystem,
        timeout: Duration,
    ) -> Result<String>;
}

#[async_trait]
impl<T: KnowledgeBackend + ?Sized> KnowledgeBackend for Arc<T> {
    async fn spoken_answer(
        &self,
        query: &str,
        units: UnitSystem,
        timeout: Duration,
    ) -> Result<String> {
        (**self).spoken_answer(query, units, timeout).await
    }
}

/// HTTP client for the Wolfram|Alpha spoken results API
pub struct WolframClient {
    client: Client,
    app_id: String,
    base_url: String,
}

impl WolframClient {
    /// Create a new Wolfram|Alpha client with explicit configuration
    pub fn new(app_id: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            app_id,
            base_url,
        }
    }

    /// Share an existing connection pool
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn spoken_url(&self) -> String {
        format!("{}/v1/spoken", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl KnowledgeBackend for WolframClient {
    async fn spoken_answer(
        &self,
        query: &str,
        units: UnitSystem,
        timeout: Duration,
    ) -> Result<String> {
        let response = self
            .client
            .get(self.spoken_url())
            .query(&[
                ("appid", self.app_id.as_str()),
                ("i", query),
                ("units", units.as_str()),
            ])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BotError::Timeout(timeout.as_millis() as u64)
                } else {
                    BotError::Knowledge(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BotError::Knowledge(e.to_string()))?;

        if status == StatusCode::NOT_IMPLEMENTED {
            return Err(BotError::Knowledge(format!("No answer: {}", body)));
        }
        if !status.is_success() {
            return Err(BotError::Knowledge(format!("API error {}: {}", status, body)));
        }
        if body.trim().is_empty() {
            return Err(BotError::Knowledge("Empty answer".into()));
        }

        Ok(body)
    }
}
