//! Command pipeline
//!
//! Message text -> CommandDispatcher -> QueryHandler -> ReplySink:
//! the dispatcher matches `query <message>`, the handler resolves the
//! message through the NLU and knowledge backends and replies once.

pub mod dispatcher;
pub mod events;
pub mod handler;
pub mod reply;

pub use dispatcher::{CommandDefinition, CommandDispatcher, CommandInvocation, Dispatched};
pub use events::{spawn_event_logger, ChannelObserver, CommandEvent, CommandObserver, NoopObserver};
pub use handler::{FailureMessages, Outcome, QueryHandler};
pub use reply::{ReplySink, StdoutReply};
