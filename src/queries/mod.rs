//! Test queries with ground truth
//!
//! Each query names the passages a tutor would consider a correct answer.
//! Any one of them appearing in the ranking counts as a hit.
//!
//! ## Query Tags
//!
//! Tags stratify the metrics. The built-in set uses:
//!
//! - **direct**: wording close to the passage
//! - **paraphrase**: same meaning, different vocabulary
//! - **notation**: symbol-heavy STEM input (`∫`, `x²`, `ΔH`, ...)
//! - **cross-topic**: the answer lives outside the obvious topic
//!
//! ## Query File Format (JSON)
//!
//! ```json
//! {
//!   "metadata": { "name": "tutoring-stem", "version": "1.0" },
//!   "queries": [
//!     {
//!       "id": "q-quadratic-direct",
//!       "query": "how do I use the quadratic formula",
//!       "expected_chunk_ids": ["alg-quadratic-formula"],
//!       "tags": ["direct"]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{BenchError, Result};

/// Tag marking symbol-heavy queries, the highest-stakes class for a tutor
pub const NOTATION_TAG: &str = "notation";

/// A labeled test query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestQuery {
    /// Unique identifier
    pub id: String,
    /// Query text
    pub query: String,
    /// Passage ids considered correct (any one counts as a hit)
    #[serde(alias = "expectedChunkIds")]
    pub expected_chunk_ids: BTreeSet<String>,
    /// Category labels
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl TestQuery {
    pub fn new<I, S>(id: impl Into<String>, query: impl Into<String>, expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            query: query.into(),
            expected_chunk_ids: expected.into_iter().map(Into::into).collect(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Metadata about a query file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFileMetadata {
    /// Name of the query set
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: String,
    /// Optional version
    #[serde(default)]
    pub version: String,
}

/// A complete query file that can be loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFile {
    /// Metadata about the query set
    pub metadata: QueryFileMetadata,
    /// The queries
    pub queries: Vec<TestQuery>,
}

impl QueryFile {
    /// Load queries from a JSON file
    ///
    /// Per-query checks run here; checks against the corpus happen in
    /// [`crate::fixtures::Fixtures::new`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::FixtureLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let query_file: QueryFile =
            serde_json::from_str(&content).map_err(|e| BenchError::FixtureLoad {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        query_file.validate()?;
        Ok(query_file)
    }

    /// Parse queries from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let query_file: QueryFile =
            serde_json::from_str(json).map_err(|e| BenchError::FixtureLoad {
                path: "<inline>".to_string(),
                message: e.to_string(),
            })?;
        query_file.validate()?;
        Ok(query_file)
    }

    /// Create a new query file
    pub fn new(name: impl Into<String>, queries: Vec<TestQuery>) -> Self {
        Self {
            metadata: QueryFileMetadata {
                name: name.into(),
                description: String::new(),
                version: "1.0".to_string(),
            },
            queries,
        }
    }

    /// Validate query text and ground truth presence
    pub fn validate(&self) -> Result<()> {
        for (i, q) in self.queries.iter().enumerate() {
            if q.query.trim().is_empty() {
                return Err(BenchError::FixtureIntegrity(format!(
                    "query {} ('{}') has empty query text",
                    i, q.id
                )));
            }
            if q.expected_chunk_ids.is_empty() {
                return Err(BenchError::FixtureIntegrity(format!(
                    "query '{}' has no expected chunk ids",
                    q.id
                )));
            }
        }
        Ok(())
    }

    /// All query texts in file order (for embedding)
    pub fn texts(&self) -> Vec<String> {
        self.queries.iter().map(|q| q.query.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_alias() {
        let json = r#"{
            "metadata": { "name": "mini" },
            "queries": [
                { "id": "q1", "query": "what is 2+2", "expectedChunkIds": ["a", "b"], "tags": ["direct"] }
            ]
        }"#;
        let file = QueryFile::from_json(json).unwrap();
        let q = &file.queries[0];
        assert_eq!(q.expected_chunk_ids, BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert!(q.tags.contains("direct"));
    }

    #[test]
    fn test_empty_expected_ids_rejected() {
        let file = QueryFile::new(
            "mini",
            vec![TestQuery::new("q1", "integrate x squared", Vec::<String>::new())],
        );
        let err = file.validate().unwrap_err();
        assert!(matches!(err, BenchError::FixtureIntegrity(_)));
    }

    #[test]
    fn test_blank_query_rejected() {
        let file = QueryFile::new("mini", vec![TestQuery::new("q1", "   ", ["a"])]);
        assert!(matches!(
            file.validate(),
            Err(BenchError::FixtureIntegrity(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.json");
        std::fs::write(
            &path,
            r#"{ "metadata": { "name": "disk" }, "queries": [
                { "id": "q1", "query": "newton's second law", "expected_chunk_ids": ["phys-newton-2"] }
            ] }"#,
        )
        .unwrap();

        let file = QueryFile::load(&path).unwrap();
        assert_eq!(file.metadata.name, "disk");
        assert_eq!(file.texts(), vec!["newton's second law"]);
        assert!(file.queries[0].tags.is_empty());
    }
}
