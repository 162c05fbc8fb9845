//! Embedding provider trait abstraction
//!
//! Defines the common contract every provider adapter implements, so that
//! providers with different request/response shapes can be compared fairly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Which side of an asymmetric embedding model a text is encoded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedRole {
    /// Corpus passage
    Document,
    /// Search query
    Query,
}

impl EmbedRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for EmbedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one or more embedding calls
///
/// `vectors[i]` always corresponds to input text `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchEmbedding {
    /// The embedding vectors, in input order
    pub vectors: Vec<Vec<f32>>,
    /// Tokens billed by the provider
    pub tokens_used: u64,
    /// Wall time of the provider round trip(s) in milliseconds
    pub latency_ms: f64,
}

impl BatchEmbedding {
    pub fn new(vectors: Vec<Vec<f32>>, tokens_used: u64, latency_ms: f64) -> Self {
        Self {
            vectors,
            tokens_used,
            latency_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector length, if any vector is present
    pub fn dimensions(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }
}

/// Unified trait for embedding providers
///
/// An implementation is a pure I/O boundary: one network call per `embed`,
/// no retries. It must return vectors in input order even when the provider
/// answers out of order.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name used in logs and reports (e.g. "voyage")
    fn name(&self) -> &str;

    /// Model identifier sent to the provider
    fn model(&self) -> &str;

    /// Embed a batch of texts for the given role
    async fn embed(&self, texts: &[String], role: EmbedRole) -> Result<BatchEmbedding>;
}

/// Helper to measure duration of an async operation
pub async fn measure_async<F, T>(f: F) -> (T, Duration)
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let result = f.await;
    let duration = start.elapsed();
    (result, duration)
}
