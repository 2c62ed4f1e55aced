//! Command dispatch - matches message text to registered commands
//!
//! Recognized forms (after an optional leading `<@BOT>` mention):
//! - `<keyword> <message>` runs the query pipeline on `<message>`
//! - `help` lists the registered commands
//!
//! Anything else is ignored.

use crate::command::events::{CommandEvent, CommandObserver, NoopObserver};
use crate::command::handler::{Outcome, QueryHandler};
use crate::command::reply::ReplySink;
use crate::core::types::IncomingQuery;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const HELP_COMMAND: &str = "help";
pub const MESSAGE_PARAM: &str = "message";

/// A registered command, as shown by `help`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    pub name: String,
    pub usage: String,
    pub description: String,
    pub examples: Vec<String>,
}

/// A message that matched a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command: String,
    pub parameters: BTreeMap<String, String>,
}

/// What a dispatch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Query(Outcome),
    Help,
    Ignored,
}

/// Routes message text to the query handler or the help listing
pub struct CommandDispatcher {
    keyword: String,
    definitions: Vec<CommandDefinition>,
    handler: QueryHandler,
    observer: Arc<dyn CommandObserver>,
}

impl CommandDispatcher {
    pub fn new(keyword: impl Into<String>, handler: QueryHandler) -> Self {
        let keyword = keyword.into();
        let definitions = vec![
            CommandDefinition {
                name: keyword.clone(),
                usage: format!("{} <message>", keyword),
                description: "Ask any question to send it to Wolfram Alpha".into(),
                examples: vec![format!("{} What are the Colors of the Rainbow?", keyword)],
            },
            CommandDefinition {
                name: HELP_COMMAND.into(),
                usage: HELP_COMMAND.into(),
                description: "List available commands".into(),
                examples: Vec::new(),
            },
        ];

        Self {
            keyword,
            definitions,
            handler,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CommandObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Match message text against the registered commands
    pub fn match_command(&self, text: &str) -> Option<CommandInvocation> {
        let text = strip_mention(text);
        let (word, rest) = text
            .split_once(char::is_whitespace)
            .unwrap_or((text, ""));

        if word.eq_ignore_ascii_case(HELP_COMMAND) {
            return Some(CommandInvocation {
                command: HELP_COMMAND.into(),
                parameters: BTreeMap::new(),
            });
        }

        if !word.eq_ignore_ascii_case(&self.keyword) {
            return None;
        }

        let message = rest.trim();
        if message.is_empty() {
            return None;
        }

        let mut parameters = BTreeMap::new();
        parameters.insert(MESSAGE_PARAM.to_string(), message.to_string());
        Some(CommandInvocation {
            command: self.keyword.clone(),
            parameters,
        })
    }

    /// Dispatch one message, replying at most once
    pub async fn dispatch(&self, text: &str, reply: &dyn ReplySink) -> Dispatched {
        let Some(invocation) = self.match_command(text) else {
            tracing::debug!("Ignoring unmatched message {:?}", text);
            return Dispatched::Ignored;
        };

        self.observer.on_command(&CommandEvent::new(
            invocation.command.clone(),
            invocation.parameters.clone(),
        ));

        if invocation.command == HELP_COMMAND {
            if let Err(e) = reply.reply(&self.help_text()).await {
                tracing::warn!("Failed to send help: {}", e);
            }
            return Dispatched::Help;
        }

        let message = invocation
            .parameters
            .get(MESSAGE_PARAM)
            .cloned()
            .unwrap_or_default();
        let outcome = self.handler.handle(IncomingQuery::new(message), reply).await;
        Dispatched::Query(outcome)
    }

    pub fn help_text(&self) -> String {
        let mut s = String::from("Available commands:\n");
        for def in &self.definitions {
            s.push_str(&format!("- `{}`: {}\n", def.usage, def.description));
            for example in &def.examples {
                s.push_str(&format!("    e.g. `{}`\n", example));
            }
        }
        s
    }
}

/// Remove a leading `<@USERID>` mention
fn strip_mention(text: &str) -> &str {
    let text = text.trim();
    if text.starts_with("<@") {
        if let Some(end) = text.find('>') {
            return text[end + 1..].trim_start();
        }
    }
    text
}
