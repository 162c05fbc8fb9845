//! Embedding providers abstraction
//!
//! Provides a unified trait for HTTP embedding providers:
//! - OpenAI (symmetric `text-embedding-3-*` models)
//! - Voyage AI (asymmetric document/query encoding)

pub(crate) mod http;
pub mod openai;
pub mod traits;
pub mod voyage;

pub use openai::OpenAiProvider;
pub use traits::{BatchEmbedding, EmbedRole, EmbeddingProvider};
pub use voyage::VoyageProvider;
