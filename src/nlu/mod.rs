//! Natural language understanding
//!
//! Wit.ai turns the user's question into entities; the extractor picks
//! out the one that becomes the knowledge query.

pub mod client;
pub mod extractor;

pub use client::{NluBackend, WitClient};
pub use extractor::{entity_from_body, EntityExtractor, WitEntityExtractor};
