//! Request-scoped value types passed down the query pipeline

use serde::{Deserialize, Serialize};

/// Raw text a user submitted with one command invocation
///
/// Not validated: empty or nonsensical text is a legal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingQuery {
    pub text: String,
}

impl IncomingQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Entity value pulled out of an NLU parse
///
/// When `found` is false the value carries no meaning and must not be
/// sent on as a knowledge query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedEntity {
    pub value: String,
    pub found: bool,
}

impl ParsedEntity {
    pub fn found(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            found: true,
        }
    }

    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Short answer returned by the knowledge backend
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Answer {
    pub text: String,
    pub ok: bool,
}

impl Answer {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ok: true,
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }
}

/// Unit preference sent along with knowledge queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_entity_is_empty() {
        let entity = ParsedEntity::not_found();
        assert!(!entity.found);
        assert!(entity.value.is_empty());
    }

    #[test]
    fn test_failed_answer_has_no_text() {
        let answer = Answer::failed();
        assert!(!answer.ok);
        assert!(answer.text.is_empty());
    }

    #[test]
    fn test_unit_system_serialization() {
        let json = serde_json::to_string(&UnitSystem::Imperial).unwrap();
        assert_eq!(json, "\"imperial\"");
        let units: UnitSystem = serde_json::from_str("\"metric\"").unwrap();
        assert_eq!(units, UnitSystem::Metric);
    }
}
