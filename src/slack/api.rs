//! Slack Web API calls used by the bot
//!
//! Slack answers every method with HTTP 200 and an `ok` flag; failures
//! carry an `error` code such as `invalid_auth` or `channel_not_found`.

use crate::core::error::{BotError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Thin client for the handful of Web API methods the bot needs
pub struct SlackApi {
    client: Client,
    bot_token: String,
    app_token: String,
    base_url: String,
}

impl SlackApi {
    pub fn new(bot_token: String, app_token: String) -> Self {
        Self {
            client: Client::new(),
            bot_token,
            app_token,
            base_url: "https://slack.com/api".into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), method)
    }

    /// Request a Socket Mode WebSocket URL (`apps.connections.open`)
    pub async fn open_connection(&self) -> Result<String> {
        let response: ConnectionsOpenResponse = self
            .client
            .post(self.method_url("apps.connections.open"))
            .bearer_auth(&self.app_token)
            .send()
            .await?
            .json()
            .await?;

        check_ok(response.ok, response.error, "apps.connections.open")?;
        response
            .url
            .ok_or_else(|| BotError::Slack("apps.connections.open returned no url".into()))
    }

    /// Look up the bot's own user ID (`auth.test`)
    pub async fn bot_user_id(&self) -> Result<String> {
        let response: AuthTestResponse = self
            .client
            .post(self.method_url("auth.test"))
            .bearer_auth(&self.bot_token)
            .send()
            .await?
            .json()
            .await?;

        check_ok(response.ok, response.error, "auth.test")?;
        response
            .user_id
            .ok_or_else(|| BotError::Slack("auth.test returned no user_id".into()))
    }

    /// Post a message to a channel, optionally inside a thread
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<()> {
        let request = PostMessageRequest {
            channel,
            text,
            thread_ts,
        };

        let response: BasicResponse = self
            .client
            .post(self.method_url("chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        check_ok(response.ok, response.error, "chat.postMessage")
    }
}

fn check_ok(ok: bool, error: Option<String>, method: &str) -> Result<()> {
    if ok {
        return Ok(());
    }
    Err(BotError::Slack(format!(
        "{} failed: {}",
        method,
        error.unwrap_or_else(|| "unknown_error".into())
    )))
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

#[derive(Deserialize)]
struct BasicResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ConnectionsOpenResponse {
    ok: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
