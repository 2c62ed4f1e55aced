//! Async Wit.ai client
//!
//! Sends free text to the `/message` endpoint and returns the raw JSON
//! body. Decoding is left to the extractor, which only reads the fields
//! it needs.

use crate::core::error::{BotError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

/// A backend that turns free text into a structured parse document
#[async_trait]
pub trait NluBackend: Send + Sync {
    /// Parse `text`, returning the backend's JSON response body
    async fn parse(&self, text: &str) -> Result<String>;
}

#[async_trait]
impl<T: NluBackend + ?Sized> NluBackend for Arc<T> {
    async fn parse(&self, text: &str) -> Result<String> {
        (**self).parse(text).await
    }
}

/// HTTP client for the Wit.ai message API
pub struct WitClient {
    client: Client,
    token: String,
    base_url: String,
    api_version: String,
}

impl WitClient {
    /// Create a new Wit.ai client with explicit configuration
    pub fn new(token: String, base_url: String, api_version: String) -> Self {
        Self {
            client: Client::new(),
            token,
            base_url,
            api_version,
        }
    }

    /// Share an existing connection pool
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn message_url(&self) -> String {
        format!("{}/message", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl NluBackend for WitClient {
    async fn parse(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .get(self.message_url())
            .bearer_auth(&self.token)
            .query(&[("v", self.api_version.as_str()), ("q", text)])
            .send()
            .await
            .map_err(|e| BotError::Nlu(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BotError::Nlu(format!("API error {}: {}", status, error_text)));
        }

        response
            .text()
            .await
            .map_err(|e| BotError::Nlu(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn test_client_creation() {
        let client = WitClient::new(
            "test-token".into(),
            "https://api.example.com".into(),
            "20240304".into(),
        );
        assert_eq!(client.token, "test-token");
        assert_eq!(client.api_version, "20240304");
    }

    #[test]
    fn test_message_url_ignores_trailing_slash() {
        let client = WitClient::new(
            "t".into(),
            "https://api.wit.ai/".into(),
            "20240304".into(),
        );
        assert_eq!(client.message_url(), "https://api.wit.ai/message");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_nlu_error() {
        let client = WitClient::new("t".into(), "http://127.0.0.1:1".into(), "1".into());
        let result = client.parse("hello").await;
        assert!(matches!(result, Err(BotError::Nlu(_))));
    }

    #[tokio::test]
    async fn test_parse_returns_body_and_sends_token() {
        let body = r#"{"text":"how tall is everest","entities":{},"traits":{}}"#;
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/message")
            .match_header("authorization", "Bearer wit-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("v".into(), "20240304".into()),
                Matcher::UrlEncoded("q".into(), "how tall is everest".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let client = WitClient::new("wit-token".into(), server.url(), "20240304".into());
        let parsed = client.parse("how tall is everest").await.unwrap();

        assert_eq!(parsed, body);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_nlu_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/message")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error":"Bad auth, check token/params","code":"no-auth"}"#)
            .create_async()
            .await;

        let client = WitClient::new("bad".into(), server.url(), "20240304".into());
        match client.parse("hello").await {
            Err(BotError::Nlu(msg)) => {
                assert!(msg.contains("401"), "unexpected message: {}", msg);
                assert!(msg.contains("no-auth"));
            }
            other => panic!("expected nlu error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extractor_over_failing_backend_finds_nothing() {
        use crate::nlu::{EntityExtractor, WitEntityExtractor};

        let mut server = Server::new_async().await;
        server
            .mock("GET", "/message")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = WitClient::new("t".into(), server.url(), "20240304".into());
        let extractor =
            WitEntityExtractor::new(client, "wit$wolfram_search_query:wolfram_search_query");
        let entity = extractor.extract("colors of the rainbow").await;

        assert!(!entity.found);
        assert!(entity.value.is_empty());
    }
}
