//! Slack integration: Web API client, Socket Mode listener, reply sink

pub mod api;
pub mod reply;
pub mod socket;

pub use api::SlackApi;
pub use reply::SlackReply;
pub use socket::{SlackCommand, SocketModeListener};
