//! Extract the question subject from an NLU parse
//!
//! The Wit.ai response is a loosely structured document. Only one path is
//! read here (`entities.<key>[0].value`), so it is decoded into a minimal
//! typed shape and anything missing or mismatched counts as "not found".

use crate::core::types::ParsedEntity;
use crate::nlu::client::NluBackend;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Turns raw user text into a single entity value
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Never fails: backend and decode errors come back as `found = false`
    async fn extract(&self, text: &str) -> ParsedEntity;
}

/// The subset of a Wit.ai `/message` response that is consumed
#[derive(Debug, Default, Deserialize)]
struct WitMessage {
    #[serde(default)]
    entities: HashMap<String, Vec<WitEntity>>,
}

#[derive(Debug, Deserialize)]
struct WitEntity {
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Entity extractor backed by an [`NluBackend`]
pub struct WitEntityExtractor<B> {
    backend: B,
    entity_key: String,
}

impl<B: NluBackend> WitEntityExtractor<B> {
    pub fn new(backend: B, entity_key: impl Into<String>) -> Self {
        Self {
            backend,
            entity_key: entity_key.into(),
        }
    }
}

#[async_trait]
impl<B: NluBackend> EntityExtractor for WitEntityExtractor<B> {
    async fn extract(&self, text: &str) -> ParsedEntity {
        match self.backend.parse(text).await {
            Ok(body) => entity_from_body(&body, &self.entity_key),
            Err(e) => {
                tracing::warn!("NLU request failed: {}", e);
                ParsedEntity::not_found()
            }
        }
    }
}

/// Read the first value of `entity_key` from a Wit.ai response body
pub fn entity_from_body(body: &str, entity_key: &str) -> ParsedEntity {
    let message: WitMessage = match serde_json::from_str(body) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Unexpected NLU response shape: {}", e);
            return ParsedEntity::not_found();
        }
    };

    let Some(first) = message
        .entities
        .get(entity_key)
        .and_then(|values| values.first())
    else {
        tracing::debug!("No {} entity in NLU response", entity_key);
        return ParsedEntity::not_found();
    };

    match &first.value {
        Some(serde_json::Value::String(value)) => {
            tracing::debug!(
                "Extracted entity {:?} (confidence {:.2})",
                value,
                first.confidence.unwrap_or_default()
            );
            ParsedEntity::found(value.clone())
        }
        _ => ParsedEntity::not_found(),
    }
}
