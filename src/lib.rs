//! Query Bot - answers Slack questions through Wit.ai and Wolfram|Alpha

pub mod app;
pub mod command;
pub mod core;
pub mod knowledge;
pub mod nlu;
pub mod slack;
