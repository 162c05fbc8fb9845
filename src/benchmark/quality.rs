//! Quality metrics for retrieval evaluation
//!
//! Scores every query against the full embedded corpus and derives
//! rank-based statistics from the position of the first correct passage.
//!
//! ## Metrics Overview
//!
//! - **Recall@K**: fraction of queries with a correct passage in the top K
//! - **MRR**: 1/rank of the first correct passage, averaged across queries
//! - **Tag breakdown**: Recall@5 and MRR recomputed per query tag
//!
//! Rankings span the entire corpus, so a query only misses completely when
//! its expected ids are absent from the corpus. Fixture loading rejects that
//! case up front.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::corpus::ContentChunk;
use crate::error::{BenchError, Result};
use crate::queries::TestQuery;

// =============================================================================
// SIMILARITY & RANKING
// =============================================================================

/// One corpus passage scored against a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryScore {
    pub chunk_id: String,
    pub topic: String,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Cosine similarity between two vectors
///
/// Vectors of unequal length are a [`BenchError::DimensionMismatch`]. A
/// zero-magnitude vector has no direction and scores 0.0 against anything,
/// as does a vector holding NaN or infinite components. The result is never
/// NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(BenchError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    // f64 accumulation: squares of large f32 components overflow f32
    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let similarity = dot_product / (norm_a * norm_b);
    if !similarity.is_finite() {
        return Ok(0.0);
    }
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}

/// Rank every corpus chunk against a query vector, best first
///
/// `corpus_vectors[i]` must be the embedding of `chunks[i]`; differing
/// lengths are a [`BenchError::CountMismatch`]. Ties keep corpus order.
pub fn rank_chunks(
    query_vector: &[f32],
    chunks: &[ContentChunk],
    corpus_vectors: &[Vec<f32>],
) -> Result<Vec<QueryScore>> {
    if chunks.len() != corpus_vectors.len() {
        return Err(BenchError::CountMismatch {
            expected: chunks.len(),
            actual: corpus_vectors.len(),
        });
    }

    let mut ranking = chunks
        .iter()
        .zip(corpus_vectors)
        .map(|(chunk, vector)| {
            Ok(QueryScore {
                chunk_id: chunk.id.clone(),
                topic: chunk.topic.clone(),
                score: cosine_similarity(query_vector, vector)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // sort_by is stable
    ranking.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    Ok(ranking)
}

/// 1-based position of the first expected chunk in a ranking
pub fn first_hit_rank(ranking: &[QueryScore], expected_ids: &BTreeSet<String>) -> Option<usize> {
    ranking
        .iter()
        .position(|s| expected_ids.contains(&s.chunk_id))
        .map(|idx| idx + 1)
}

/// `1/rank`, or 0.0 when nothing matched
pub fn reciprocal_rank(rank: Option<usize>) -> f32 {
    match rank {
        Some(r) if r > 0 => 1.0 / r as f32,
        _ => 0.0,
    }
}

// =============================================================================
// AGGREGATE METRICS
// =============================================================================

/// Ranking outcome of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_id: String,
    /// 1-based rank of the first correct passage
    pub first_hit_rank: Option<usize>,
}

impl QueryResult {
    pub fn new(query_id: impl Into<String>, first_hit_rank: Option<usize>) -> Self {
        Self {
            query_id: query_id.into(),
            first_hit_rank,
        }
    }

    pub fn reciprocal_rank(&self) -> f32 {
        reciprocal_rank(self.first_hit_rank)
    }

    /// Whether the first hit is within the top `k`
    pub fn hit_at(&self, k: usize) -> bool {
        self.first_hit_rank.is_some_and(|r| r <= k)
    }
}

/// Fraction of queries whose first hit ranks at or above `k`
pub fn recall_at_k(results: &[QueryResult], k: usize) -> f32 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().filter(|r| r.hit_at(k)).count() as f32 / results.len() as f32
}

/// Mean of per-query reciprocal ranks
pub fn mean_reciprocal_rank(results: &[QueryResult]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(QueryResult::reciprocal_rank).sum::<f32>() / results.len() as f32
}

/// Metrics restricted to queries carrying one tag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagMetrics {
    pub recall5: f32,
    pub mrr: f32,
    /// Queries carrying the tag
    pub count: usize,
}

/// Recall@5 and MRR per tag
///
/// A query with several tags counts toward each of them. Results are joined
/// to queries by id; results without a matching query are ignored.
pub fn tag_breakdown(results: &[QueryResult], queries: &[TestQuery]) -> BTreeMap<String, TagMetrics> {
    let by_id: HashMap<&str, &TestQuery> = queries.iter().map(|q| (q.id.as_str(), q)).collect();

    let mut buckets: BTreeMap<&str, Vec<QueryResult>> = BTreeMap::new();
    for result in results {
        let Some(query) = by_id.get(result.query_id.as_str()) else {
            continue;
        };
        for tag in &query.tags {
            buckets.entry(tag.as_str()).or_default().push(result.clone());
        }
    }

    buckets
        .into_iter()
        .map(|(tag, subset)| {
            let metrics = TagMetrics {
                recall5: recall_at_k(&subset, 5),
                mrr: mean_reciprocal_rank(&subset),
                count: subset.len(),
            };
            (tag.to_string(), metrics)
        })
        .collect()
}
