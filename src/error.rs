//! Error types for the retrieval benchmark
//!
//! Only [`BenchError::RateLimited`] (and provider errors the retry policy
//! classifies as rate limits) is ever recovered locally. Everything else
//! aborts the provider run it occurred in.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Which embedding pass of a provider run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Embedding corpus passages (role = document)
    Documents,
    /// Embedding test queries (role = query)
    Queries,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Documents => "document",
            Self::Queries => "query",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur while loading fixtures or running a benchmark
#[derive(Error, Debug)]
pub enum BenchError {
    /// No provider has credentials available
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Provider config file could not be read or parsed
    #[error("invalid config {path}: {message}")]
    Config { path: String, message: String },

    /// Similarity requested between vectors of unequal length
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// Vector list whose length does not match the items it embeds
    #[error("expected {expected} vectors, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// Transient provider signal, eligible for retry
    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: String, message: String },

    /// Non rate-limit provider failure, never retried
    #[error("{provider}: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    /// A query references a chunk that is not in the corpus, or ids collide
    #[error("fixture integrity error: {0}")]
    FixtureIntegrity(String),

    /// A fixture file could not be read or parsed
    #[error("failed to load fixture {path}: {message}")]
    FixtureLoad { path: String, message: String },

    /// A provider run aborted while embedding one of its passes
    #[error("{provider}: {phase} embedding failed: {source}")]
    EmbeddingFailed {
        provider: String,
        phase: Phase,
        #[source]
        source: Box<BenchError>,
    },

    /// A provider run exceeded its external deadline
    #[error("{provider}: run exceeded {limit:?}")]
    Timeout { provider: String, limit: Duration },
}

impl BenchError {
    /// Build a provider error tagged with the provider name
    pub fn provider(provider: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            provider: provider.into(),
            source,
        }
    }

    /// HTTP status code carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Provider {
                source: ProviderError::Http { status, .. },
                ..
            } => Some(*status),
            Self::EmbeddingFailed { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Failures at the provider I/O boundary
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Non-2xx response
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection, TLS or timeout failure before a response arrived
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),
}
