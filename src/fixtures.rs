//! Validated corpus + query set
//!
//! Fixtures are passed explicitly into the runner so several corpora can be
//! benchmarked in one process. Cross-file integrity is checked here, at load
//! time, so a typo in a ground-truth id never shows up as a silent zero
//! reciprocal rank in the middle of a run.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::corpus::{ContentChunk, CorpusFile};
use crate::error::{BenchError, Result};
use crate::queries::{QueryFile, TestQuery};

const BUILTIN_CORPUS: &str = include_str!("../fixtures/corpus.json");
const BUILTIN_QUERIES: &str = include_str!("../fixtures/queries.json");

/// A corpus and a query set that have been checked against each other
#[derive(Debug, Clone)]
pub struct Fixtures {
    corpus: CorpusFile,
    queries: QueryFile,
}

impl Fixtures {
    /// Validate a corpus and query set together
    ///
    /// Fails with [`BenchError::FixtureIntegrity`] if the corpus is empty, ids
    /// collide, or any expected chunk id is absent from the corpus.
    pub fn new(corpus: CorpusFile, queries: QueryFile) -> Result<Self> {
        if corpus.chunks.is_empty() {
            return Err(BenchError::FixtureIntegrity(format!(
                "corpus '{}' has no chunks",
                corpus.metadata.name
            )));
        }

        let mut chunk_ids = HashSet::with_capacity(corpus.chunks.len());
        for chunk in &corpus.chunks {
            if !chunk_ids.insert(chunk.id.as_str()) {
                return Err(BenchError::FixtureIntegrity(format!(
                    "duplicate chunk id '{}'",
                    chunk.id
                )));
            }
        }

        queries.validate()?;

        let mut query_ids = HashSet::with_capacity(queries.queries.len());
        for query in &queries.queries {
            if !query_ids.insert(query.id.as_str()) {
                return Err(BenchError::FixtureIntegrity(format!(
                    "duplicate query id '{}'",
                    query.id
                )));
            }
            let missing: Vec<&str> = query
                .expected_chunk_ids
                .iter()
                .map(String::as_str)
                .filter(|id| !chunk_ids.contains(id))
                .collect();
            if !missing.is_empty() {
                return Err(BenchError::FixtureIntegrity(format!(
                    "query '{}' expects unknown chunk id(s): {}",
                    query.id,
                    missing.join(", ")
                )));
            }
        }

        Ok(Self { corpus, queries })
    }

    /// The tutoring fixture set compiled into the binary
    pub fn builtin() -> Result<Self> {
        let corpus = CorpusFile::from_json(BUILTIN_CORPUS)?;
        let queries = QueryFile::from_json(BUILTIN_QUERIES)?;
        Self::new(corpus, queries)
    }

    /// Load fixtures from files, falling back to the built-in set for any
    /// path not given
    pub fn load(corpus_path: Option<&Path>, queries_path: Option<&Path>) -> Result<Self> {
        let corpus = match corpus_path {
            Some(path) => CorpusFile::load(path)?,
            None => CorpusFile::from_json(BUILTIN_CORPUS)?,
        };
        let queries = match queries_path {
            Some(path) => QueryFile::load(path)?,
            None => QueryFile::from_json(BUILTIN_QUERIES)?,
        };
        Self::new(corpus, queries)
    }

    pub fn corpus(&self) -> &CorpusFile {
        &self.corpus
    }

    pub fn chunks(&self) -> &[ContentChunk] {
        &self.corpus.chunks
    }

    pub fn query_file(&self) -> &QueryFile {
        &self.queries
    }

    pub fn queries(&self) -> &[TestQuery] {
        &self.queries.queries
    }

    /// Number of queries carrying each tag
    pub fn tag_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for query in self.queries() {
            for tag in &query.tags {
                *counts.entry(tag.as_str()).or_default() += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mini_corpus() -> CorpusFile {
        CorpusFile::new(
            "mini",
            vec![
                ContentChunk::new("a", "math", "fractions", "adding fractions"),
                ContentChunk::new("b", "math", "decimals", "rounding decimals"),
            ],
        )
    }

    #[test]
    fn test_builtin_fixtures_are_valid() {
        let fixtures = Fixtures::builtin().unwrap();
        assert!(fixtures.chunks().len() >= 20);
        assert!(fixtures.queries().len() >= 20);
        let tags = fixtures.tag_counts();
        for tag in ["direct", "paraphrase", "notation", "cross-topic"] {
            assert!(tags.get(tag).copied().unwrap_or(0) > 0, "missing tag {tag}");
        }
    }

    #[test]
    fn test_unknown_expected_id_fails_at_load() {
        let queries = QueryFile::new(
            "mini",
            vec![TestQuery::new("q1", "add one half and one third", ["a", "zzz"])],
        );
        let err = Fixtures::new(mini_corpus(), queries).unwrap_err();
        match err {
            BenchError::FixtureIntegrity(message) => {
                assert!(message.contains("q1"));
                assert!(message.contains("zzz"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_chunk_id_rejected() {
        let mut corpus = mini_corpus();
        corpus
            .chunks
            .push(ContentChunk::new("a", "math", "again", "duplicate id"));
        let queries = QueryFile::new("mini", vec![TestQuery::new("q1", "fractions", ["a"])]);
        assert!(matches!(
            Fixtures::new(corpus, queries),
            Err(BenchError::FixtureIntegrity(_))
        ));
    }

    #[test]
    fn test_duplicate_query_id_rejected() {
        let queries = QueryFile::new(
            "mini",
            vec![
                TestQuery::new("q1", "fractions", ["a"]),
                TestQuery::new("q1", "decimals", ["b"]),
            ],
        );
        assert!(matches!(
            Fixtures::new(mini_corpus(), queries),
            Err(BenchError::FixtureIntegrity(_))
        ));
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let corpus = CorpusFile::new("empty", vec![]);
        let queries = QueryFile::new("mini", vec![]);
        assert!(matches!(
            Fixtures::new(corpus, queries),
            Err(BenchError::FixtureIntegrity(_))
        ));
    }

    #[test]
    fn test_load_mixes_file_and_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.json");
        std::fs::write(
            &path,
            r#"{ "metadata": { "name": "custom" }, "queries": [
                { "id": "q1", "query": "F = ma", "expected_chunk_ids": ["phys-newton-second-law"], "tags": ["notation"] }
            ] }"#,
        )
        .unwrap();

        let fixtures = Fixtures::load(None, Some(&path)).unwrap();
        assert_eq!(fixtures.query_file().metadata.name, "custom");
        assert_eq!(fixtures.queries().len(), 1);
        assert_eq!(fixtures.corpus().metadata.name, "tutoring-stem");
    }
}
