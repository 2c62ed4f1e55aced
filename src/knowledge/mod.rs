//! Computational knowledge backend (Wolfram|Alpha)

pub mod client;
pub mod resolver;

pub use client::{KnowledgeBackend, WolframClient};
pub use resolver::{AnswerResolver, SpokenAnswerResolver};
