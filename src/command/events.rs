//! Command telemetry
//!
//! One [`CommandEvent`] is emitted per dispatched command. Observers are
//! best-effort: they must not block and their failures are ignored.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Record of a single dispatched command
#[derive(Debug, Clone, Serialize)]
pub struct CommandEvent {
    pub id: Uuid,
    pub command: String,
    pub parameters: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CommandEvent {
    pub fn new(command: impl Into<String>, parameters: BTreeMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.into(),
            parameters,
            timestamp: Utc::now(),
        }
    }
}

/// Receives command events
pub trait CommandObserver: Send + Sync {
    fn on_command(&self, event: &CommandEvent);
}

/// Discards every event
pub struct NoopObserver;

impl CommandObserver for NoopObserver {
    fn on_command(&self, _event: &CommandEvent) {}
}

/// Forwards events into a bounded channel without waiting
///
/// Events are dropped when the channel is full or its receiver is gone.
pub struct ChannelObserver {
    tx: mpsc::Sender<CommandEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<CommandEvent>) -> Self {
        Self { tx }
    }

    /// Create an observer along with its receiving end
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<CommandEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

impl CommandObserver for ChannelObserver {
    fn on_command(&self, event: &CommandEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            tracing::trace!("Dropped command event: {}", e);
        }
    }
}

/// Drain events into the debug log until every sender is dropped
pub fn spawn_event_logger(mut rx: mpsc::Receiver<CommandEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            tracing::debug!(
                id = %event.id,
                command = %event.command,
                parameters = ?event.parameters,
                timestamp = %event.timestamp,
                "Command event"
            );
        }
    })
}
