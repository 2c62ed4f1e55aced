use crate::command::ReplySink;
use crate::core::error::Result;
use crate::slack::api::SlackApi;
use async_trait::async_trait;
use std::sync::Arc;

/// Replies into the Slack conversation a command came from
pub struct SlackReply {
    api: Arc<SlackApi>,
    channel: String,
    thread_ts: Option<String>,
}

impl SlackReply {
    pub fn new(api: Arc<SlackApi>, channel: String, thread_ts: Option<String>) -> Self {
        Self {
            api,
            channel,
            thread_ts,
        }
    }
}

#[async_trait]
impl ReplySink for SlackReply {
    async fn reply(&self, text: &str) -> Result<()> {
        self.api
            .post_message(&self.channel, text, self.thread_ts.as_deref())
            .await
    }
}
