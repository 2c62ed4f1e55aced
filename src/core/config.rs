//! Bot configuration with documented defaults
//!
//! Values are layered: built-in defaults, then an optional TOML file,
//! then environment variables. Credentials are normally supplied through
//! the environment and are checked once at startup.

use crate::core::error::{BotError, Result};
use crate::core::types::UnitSystem;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "QUERY_BOT_CONFIG";

/// Configuration for the bot and its two backends
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    // === CREDENTIALS ===
    /// Slack bot token (`xoxb-...`), used for Web API calls such as posting replies
    pub slack_bot_token: String,

    /// Slack app-level token (`xapp-...`), used to open Socket Mode connections
    pub slack_app_token: String,

    /// Wit.ai server access token
    pub wit_token: String,

    /// Wolfram|Alpha application ID
    pub wolfram_app_id: String,

    // === NLU ===
    /// Base URL of the Wit.ai HTTP API
    pub wit_base_url: String,

    /// Wit.ai API version, sent as the `v` query parameter
    pub wit_api_version: String,

    /// Entity whose first value becomes the knowledge query
    ///
    /// Wit.ai keys entities as `<entity>:<role>`; the built-in
    /// `wit$wolfram_search_query` entity captures the question subject.
    pub wit_entity_key: String,

    // === KNOWLEDGE ===
    /// Base URL of the Wolfram|Alpha API
    pub wolfram_base_url: String,

    /// Unit system requested for computed answers
    pub units: UnitSystem,

    /// Upper bound on a single knowledge query, in milliseconds
    ///
    /// A query that takes longer is reported as "no answer".
    pub answer_timeout_ms: u64,

    // === COMMANDS ===
    /// Keyword that introduces a question, as in `@bot query <message>`
    pub command_keyword: String,

    /// Reply sent when the NLU backend yields no usable entity
    pub not_understood_message: String,

    /// Reply sent when the knowledge backend yields no answer
    pub no_answer_message: String,

    // === TELEMETRY ===
    /// Log one event per dispatched command at debug level
    pub telemetry: bool,

    /// Events buffered before new ones are dropped
    pub telemetry_buffer: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            slack_bot_token: String::new(),
            slack_app_token: String::new(),
            wit_token: String::new(),
            wolfram_app_id: String::new(),

            wit_base_url: "https://api.wit.ai".into(),
            wit_api_version: "20240304".into(),
            wit_entity_key: "wit$wolfram_search_query:wolfram_search_query".into(),

            wolfram_base_url: "https://api.wolframalpha.com".into(),
            units: UnitSystem::Metric,
            answer_timeout_ms: 1000,

            command_keyword: "query".into(),
            not_understood_message: "Sorry, I couldn't understand that question.".into(),
            no_answer_message: "Sorry, I couldn't find an answer to that.".into(),

            telemetry: true,
            telemetry_buffer: 64,
        }
    }
}

impl BotConfig {
    /// Load configuration from an optional file and the process environment
    ///
    /// The file path is `path` if given, else `QUERY_BOT_CONFIG` if set.
    /// Environment variables override anything read from the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok();
        let path = path.or(env_path.as_deref().map(Path::new));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a TOML config file; missing keys fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from environment-style lookups
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };

        set(&mut self.slack_bot_token, "SLACK_BOT_TOKEN");
        set(&mut self.slack_app_token, "SLACK_APP_TOKEN");
        set(&mut self.wit_token, "WIT_AI_TOKEN");
        set(&mut self.wolfram_app_id, "WOLFRAM_APP_ID");
        set(&mut self.wit_api_version, "WIT_API_VERSION");
        set(&mut self.command_keyword, "QUERY_BOT_KEYWORD");

        if let Some(units) = lookup("QUERY_BOT_UNITS") {
            self.units = match units.to_lowercase().as_str() {
                "metric" => UnitSystem::Metric,
                "imperial" => UnitSystem::Imperial,
                other => {
                    return Err(BotError::Config(format!(
                        "QUERY_BOT_UNITS must be metric or imperial, got {:?}",
                        other
                    )))
                }
            };
        }

        if let Some(timeout) = lookup("QUERY_BOT_ANSWER_TIMEOUT_MS") {
            self.answer_timeout_ms = timeout.trim().parse().map_err(|_| {
                BotError::Config(format!(
                    "QUERY_BOT_ANSWER_TIMEOUT_MS must be an integer, got {:?}",
                    timeout
                ))
            })?;
        }

        Ok(())
    }

    /// Check the credentials needed to query both backends
    pub fn require_backends(&self) -> Result<()> {
        require("WIT_AI_TOKEN", &self.wit_token)?;
        require("WOLFRAM_APP_ID", &self.wolfram_app_id)
    }

    /// Check every credential needed to serve Slack commands
    pub fn require_all(&self) -> Result<()> {
        require("SLACK_BOT_TOKEN", &self.slack_bot_token)?;
        require("SLACK_APP_TOKEN", &self.slack_app_token)?;
        self.require_backends()
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BotError::Config(format!("{} not set", name)));
    }
    Ok(())
}
