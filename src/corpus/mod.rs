//! Corpus of labeled reference passages
//!
//! Passages are immutable fixture data: loaded once, validated against the
//! query set (see [`crate::fixtures`]) and never mutated afterwards.

pub mod loader;

pub use loader::{ContentChunk, CorpusFile, CorpusMetadata};
