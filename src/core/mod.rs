pub mod config;
pub mod error;
pub mod types;

pub use config::BotConfig;
pub use error::{BotError, Result};
pub use types::{Answer, IncomingQuery, ParsedEntity, UnitSystem};
