//! Benchmark infrastructure
//!
//! Scores embedded queries against an embedded corpus and compares providers.
//!
//! ## Usage
//!
//! ```bash
//! retrieval-benchmark run --config providers.toml
//! ```
//!
//! ## Modules
//!
//! - `quality` - Cosine ranking and IR metrics (Recall@K, MRR, tag breakdown)
//! - `runner` - One end-to-end run per provider
//! - `report` - Comparative text report and winner/draw verdict

pub mod quality;
pub mod report;
pub mod runner;

pub use quality::{
    cosine_similarity, first_hit_rank, mean_reciprocal_rank, rank_chunks, recall_at_k,
    reciprocal_rank, tag_breakdown, QueryResult, QueryScore, TagMetrics,
};
pub use report::{compute_verdict, flagged_queries, render_report, Report, Verdict};
pub use runner::{BenchmarkResult, BenchmarkRunner, QueryDetail};
