//! Retrieval benchmark library
//!
//! Provides tools for comparing embedding providers on a hand-labeled
//! corpus: fixture loading, provider adapters, rate-limit-aware batching,
//! ranking metrics and a comparative report.

pub mod benchmark;
pub mod config;
pub mod corpus;
pub mod embedders;
pub mod error;
pub mod fixtures;
pub mod orchestrator;
pub mod queries;

pub use error::{BenchError, Result};
