//! End-to-end benchmark run for one provider
//!
//! Embeds the corpus (role = document), then the queries (role = query),
//! ranks every query against the whole embedded corpus and folds the
//! rankings into a [`BenchmarkResult`]. A provider either completes or
//! fails as a whole; partial results are never returned.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use super::quality::{
    first_hit_rank, mean_reciprocal_rank, rank_chunks, recall_at_k, reciprocal_rank,
    tag_breakdown, QueryResult, QueryScore, TagMetrics,
};
use crate::embedders::{BatchEmbedding, EmbedRole, EmbeddingProvider};
use crate::error::{BenchError, Phase, Result};
use crate::fixtures::Fixtures;
use crate::orchestrator::{BatchEmbedder, Sleeper, TokioSleeper};

/// Ranked matches kept per query in the result
pub const TOP_MATCHES: usize = 5;

/// Per-query outcome kept for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDetail {
    pub query_id: String,
    pub query: String,
    pub tags: BTreeSet<String>,
    pub expected_ids: BTreeSet<String>,
    /// Best `TOP_MATCHES` passages, best first
    pub top_matches: Vec<QueryScore>,
    /// An expected passage is among `top_matches`
    pub hit: bool,
    pub first_hit_rank: Option<usize>,
    pub reciprocal_rank: f32,
}

impl QueryDetail {
    pub fn is_expected(&self, chunk_id: &str) -> bool {
        self.expected_ids.contains(chunk_id)
    }
}

/// Aggregate outcome of one provider run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub provider: String,
    pub model: String,
    pub total_queries: usize,
    pub recall1: f32,
    pub recall3: f32,
    pub recall5: f32,
    pub mrr: f32,
    /// Mean wall time per provider call
    pub avg_latency_ms: f64,
    pub total_tokens: u64,
    /// Vector length produced by the model
    pub dimensions: usize,
    pub tag_breakdown: BTreeMap<String, TagMetrics>,
    pub query_details: Vec<QueryDetail>,
}

impl BenchmarkResult {
    /// Fold embedded corpus and queries into a result
    ///
    /// `doc_vectors[i]` belongs to corpus chunk `i`, `query_vectors[j]` to
    /// query `j`.
    pub fn evaluate(
        provider: impl Into<String>,
        model: impl Into<String>,
        fixtures: &Fixtures,
        doc_vectors: &[Vec<f32>],
        query_vectors: &[Vec<f32>],
    ) -> Result<Self> {
        let queries = fixtures.queries();
        if queries.len() != query_vectors.len() {
            return Err(BenchError::CountMismatch {
                expected: queries.len(),
                actual: query_vectors.len(),
            });
        }

        let mut results = Vec::with_capacity(queries.len());
        let mut query_details = Vec::with_capacity(queries.len());

        for (query, vector) in queries.iter().zip(query_vectors) {
            let ranking = rank_chunks(vector, fixtures.chunks(), doc_vectors)?;
            let rank = first_hit_rank(&ranking, &query.expected_chunk_ids);

            results.push(QueryResult::new(query.id.clone(), rank));
            query_details.push(QueryDetail {
                query_id: query.id.clone(),
                query: query.query.clone(),
                tags: query.tags.clone(),
                expected_ids: query.expected_chunk_ids.clone(),
                top_matches: ranking.into_iter().take(TOP_MATCHES).collect(),
                hit: rank.is_some_and(|r| r <= TOP_MATCHES),
                first_hit_rank: rank,
                reciprocal_rank: reciprocal_rank(rank),
            });
        }

        Ok(Self {
            provider: provider.into(),
            model: model.into(),
            total_queries: results.len(),
            recall1: recall_at_k(&results, 1),
            recall3: recall_at_k(&results, 3),
            recall5: recall_at_k(&results, 5),
            mrr: mean_reciprocal_rank(&results),
            avg_latency_ms: 0.0,
            total_tokens: 0,
            dimensions: doc_vectors.first().map(Vec::len).unwrap_or(0),
            tag_breakdown: tag_breakdown(&results, queries),
            query_details,
        })
    }

    pub fn detail(&self, query_id: &str) -> Option<&QueryDetail> {
        self.query_details.iter().find(|d| d.query_id == query_id)
    }

    /// MRR over queries carrying `tag`, if any query does
    pub fn tag_mrr(&self, tag: &str) -> Option<f32> {
        self.tag_breakdown.get(tag).map(|m| m.mrr)
    }

    /// Format as a summary string
    pub fn format_summary(&self) -> String {
        format!(
            "R@1: {:.1}% | R@3: {:.1}% | R@5: {:.1}% | MRR: {:.3} | {:.0}ms/call | {} tokens | Queries: {}",
            self.recall1 * 100.0,
            self.recall3 * 100.0,
            self.recall5 * 100.0,
            self.mrr,
            self.avg_latency_ms,
            self.total_tokens,
            self.total_queries
        )
    }
}

/// Runs the benchmark for one provider at a time
pub struct BenchmarkRunner<'a, S = TokioSleeper> {
    fixtures: &'a Fixtures,
    embedder: BatchEmbedder<S>,
    timeout: Option<Duration>,
}

impl<'a, S: Sleeper> BenchmarkRunner<'a, S> {
    pub fn new(fixtures: &'a Fixtures, embedder: BatchEmbedder<S>) -> Self {
        Self {
            fixtures,
            embedder,
            timeout: None,
        }
    }

    /// Hard deadline for a whole provider run, retries included
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Benchmark one provider
    ///
    /// Embedding failures come back as [`BenchError::EmbeddingFailed`] naming
    /// the phase; an expired deadline as [`BenchError::Timeout`].
    pub async fn run(&self, provider: &dyn EmbeddingProvider) -> Result<BenchmarkResult> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_to_completion(provider))
                .await
                .map_err(|_| BenchError::Timeout {
                    provider: provider.name().to_string(),
                    limit,
                })?,
            None => self.run_to_completion(provider).await,
        }
    }

    async fn run_to_completion(&self, provider: &dyn EmbeddingProvider) -> Result<BenchmarkResult> {
        let started = Instant::now();
        let chunk_texts = self.fixtures.corpus().texts();
        let query_texts = self.fixtures.query_file().texts();

        tracing::info!(
            provider = provider.name(),
            model = provider.model(),
            chunks = chunk_texts.len(),
            queries = query_texts.len(),
            batch_size = self.embedder.batch_size(),
            "starting benchmark run"
        );

        let docs = self
            .embed_phase(provider, &chunk_texts, Phase::Documents)
            .await?;
        let queries = self
            .embed_phase(provider, &query_texts, Phase::Queries)
            .await?;

        if let (Some(doc_dims), Some(query_dims)) = (docs.dimensions(), queries.dimensions()) {
            if doc_dims != query_dims {
                return Err(BenchError::EmbeddingFailed {
                    provider: provider.name().to_string(),
                    phase: Phase::Queries,
                    source: Box::new(BenchError::DimensionMismatch {
                        left: doc_dims,
                        right: query_dims,
                    }),
                });
            }
        }

        let mut result = BenchmarkResult::evaluate(
            provider.name(),
            provider.model(),
            self.fixtures,
            &docs.vectors,
            &queries.vectors,
        )?;

        let calls = self.embedder.batch_count(chunk_texts.len())
            + self.embedder.batch_count(query_texts.len());
        result.total_tokens = docs.tokens_used + queries.tokens_used;
        result.avg_latency_ms = if calls > 0 {
            (docs.latency_ms + queries.latency_ms) / calls as f64
        } else {
            0.0
        };

        tracing::info!(
            provider = provider.name(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "{}",
            result.format_summary()
        );
        Ok(result)
    }

    async fn embed_phase(
        &self,
        provider: &dyn EmbeddingProvider,
        texts: &[String],
        phase: Phase,
    ) -> Result<BatchEmbedding> {
        let role = match phase {
            Phase::Documents => EmbedRole::Document,
            Phase::Queries => EmbedRole::Query,
        };
        self.embedder
            .embed_all(provider, texts, role)
            .await
            .map_err(|source| BenchError::EmbeddingFailed {
                provider: provider.name().to_string(),
                phase,
                source: Box::new(source),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{ContentChunk, CorpusFile};
    use crate::error::ProviderError;
    use crate::orchestrator::RetryPolicy;
    use crate::queries::{QueryFile, TestQuery};
    use std::sync::Mutex;

    /// Sleeper that returns immediately
    struct NoSleep;

    #[async_trait::async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    /// Embeds texts by keyword into a fixed 3-d space
    ///
    /// "algebra" -> x, "physics" -> y, "chemistry" -> z.
    struct KeywordProvider {
        fail_role: Option<EmbedRole>,
        roles: Mutex<Vec<EmbedRole>>,
    }

    impl KeywordProvider {
        fn new() -> Self {
            Self {
                fail_role: None,
                roles: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(role: EmbedRole) -> Self {
            Self {
                fail_role: Some(role),
                roles: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for KeywordProvider {
        fn name(&self) -> &str {
            "keyword"
        }

        fn model(&self) -> &str {
            "keyword-3d"
        }

        async fn embed(&self, texts: &[String], role: EmbedRole) -> Result<BatchEmbedding> {
            self.roles.lock().unwrap().push(role);
            if self.fail_role == Some(role) {
                return Err(BenchError::provider(
                    "keyword",
                    ProviderError::Http {
                        status: 500,
                        body: "internal error".to_string(),
                    },
                ));
            }
            let vectors = texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("algebra") { 1.0 } else { 0.0 },
                        if t.contains("physics") { 1.0 } else { 0.0 },
                        if t.contains("chemistry") { 1.0 } else { 0.0 },
                    ]
                })
                .collect();
            Ok(BatchEmbedding::new(vectors, texts.len() as u64, 10.0))
        }
    }

    fn fixtures() -> Fixtures {
        let corpus = CorpusFile::new(
            "mini",
            vec![
                ContentChunk::new("alg", "maths", "algebra", "Algebra: solving for x"),
                ContentChunk::new("phys", "science", "mechanics", "Physics: F = ma"),
                ContentChunk::new("chem", "science", "stoichiometry", "Chemistry: moles"),
            ],
        );
        let queries = QueryFile::new(
            "mini",
            vec![
                TestQuery::new("q-alg", "algebra question", ["alg"]).with_tags(["direct"]),
                TestQuery::new("q-phys", "physics question", ["phys"]).with_tags(["direct", "notation"]),
                // phys and chem tie; corpus order decides
                TestQuery::new("q-mixed", "chemistry or physics", ["phys"]).with_tags(["cross-topic"]),
            ],
        );
        Fixtures::new(corpus, queries).unwrap()
    }

    fn runner(fixtures: &Fixtures, batch_size: usize) -> BenchmarkRunner<'_, NoSleep> {
        BenchmarkRunner::new(
            fixtures,
            BatchEmbedder::with_sleeper(batch_size, RetryPolicy::default(), NoSleep),
        )
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let fixtures = fixtures();
        let provider = KeywordProvider::new();

        let result = runner(&fixtures, 2).run(&provider).await.unwrap();

        assert_eq!(result.provider, "keyword");
        assert_eq!(result.model, "keyword-3d");
        assert_eq!(result.total_queries, 3);
        assert_eq!(result.dimensions, 3);
        assert_eq!(result.total_tokens, 6);
        // 2 document batches + 2 query batches at 10ms each
        assert!((result.avg_latency_ms - 10.0).abs() < 1e-9);

        let alg = result.detail("q-alg").unwrap();
        assert_eq!(alg.first_hit_rank, Some(1));
        assert_eq!(alg.top_matches.len(), 3);
        assert!(alg.hit);

        // chem and phys both score 1/sqrt(2); corpus order puts phys first
        let mixed = result.detail("q-mixed").unwrap();
        assert_eq!(mixed.first_hit_rank, Some(1));
        assert_eq!(mixed.top_matches[0].chunk_id, "phys");

        assert_eq!(result.recall1, 1.0);
        assert_eq!(result.mrr, 1.0);
        assert_eq!(result.tag_breakdown["direct"].count, 2);
        assert_eq!(result.tag_mrr("notation"), Some(1.0));
        assert_eq!(result.tag_mrr("missing"), None);

        let roles = provider.roles.lock().unwrap().clone();
        assert_eq!(
            roles,
            vec![EmbedRole::Document, EmbedRole::Document, EmbedRole::Query, EmbedRole::Query]
        );
    }

    #[tokio::test]
    async fn test_document_failure_names_phase() {
        let fixtures = fixtures();
        let provider = KeywordProvider::failing_on(EmbedRole::Document);

        let err = runner(&fixtures, 10).run(&provider).await.unwrap_err();
        match err {
            BenchError::EmbeddingFailed { provider, phase, .. } => {
                assert_eq!(provider, "keyword");
                assert_eq!(phase, Phase::Documents);
            }
            other => panic!("unexpected error: {other}"),
        }
        // no query embedding after a document failure
        assert_eq!(provider.roles.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_names_phase() {
        let fixtures = fixtures();
        let provider = KeywordProvider::failing_on(EmbedRole::Query);

        let err = runner(&fixtures, 10).run(&provider).await.unwrap_err();
        assert!(matches!(
            err,
            BenchError::EmbeddingFailed {
                phase: Phase::Queries,
                ..
            }
        ));
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_failure() {
        struct Stalled;

        #[async_trait::async_trait]
        impl EmbeddingProvider for Stalled {
            fn name(&self) -> &str {
                "stalled"
            }
            fn model(&self) -> &str {
                "never"
            }
            async fn embed(&self, _texts: &[String], _role: EmbedRole) -> Result<BatchEmbedding> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(BatchEmbedding::default())
            }
        }

        let fixtures = fixtures();
        let runner = runner(&fixtures, 10).with_timeout(Some(Duration::from_secs(5)));

        let err = runner.run(&Stalled).await.unwrap_err();
        assert!(matches!(err, BenchError::Timeout { .. }));
    }

    #[test]
    fn test_evaluate_misses_and_hit_flag() {
        let fixtures = fixtures();
        let docs = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
        // every query points at chem
        let queries = vec![vec![0.0, 0.0, 1.0]; 3];

        let result = BenchmarkResult::evaluate("p", "m", &fixtures, &docs, &queries).unwrap();

        // alg and phys score 0.0 and keep corpus order behind chem
        assert_eq!(result.detail("q-alg").unwrap().first_hit_rank, Some(2));
        assert_eq!(result.detail("q-phys").unwrap().first_hit_rank, Some(3));
        assert!(result.query_details.iter().all(|d| d.hit));
        assert_eq!(result.recall1, 0.0);
        assert!((result.mrr - (0.5 + 1.0 / 3.0 + 1.0 / 3.0) / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_rejects_vector_count_mismatch() {
        let fixtures = fixtures();
        let docs = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];

        let err = BenchmarkResult::evaluate("p", "m", &fixtures, &docs, &[vec![1.0, 0.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, BenchError::CountMismatch { expected: 3, actual: 1 }));

        let queries = vec![vec![1.0, 0.0, 0.0]; 3];
        let err = BenchmarkResult::evaluate("p", "m", &fixtures, &docs[..2], &queries).unwrap_err();
        assert!(matches!(err, BenchError::CountMismatch { expected: 3, actual: 2 }));
    }
}
