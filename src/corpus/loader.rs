//! Corpus fixture loader
//!
//! Loads labeled reference passages from a JSON file.
//!
//! ## Corpus File Format (JSON)
//!
//! ```json
//! {
//!   "metadata": {
//!     "name": "tutoring-stem",
//!     "description": "Reference passages for STEM tutoring",
//!     "version": "1.0"
//!   },
//!   "chunks": [
//!     {
//!       "id": "alg-quadratic-formula",
//!       "subject": "math",
//!       "topic": "quadratics",
//!       "content": "The quadratic formula x = (-b ± √(b² - 4ac)) / 2a ...",
//!       "tags": ["algebra", "formula"]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{BenchError, Result};

/// A labeled reference passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Unique, stable identifier
    pub id: String,
    /// Subject area (math, physics, chemistry, ...)
    pub subject: String,
    /// Topic within the subject
    pub topic: String,
    /// Text body that gets embedded
    pub content: String,
    /// Category labels used for stratified analysis
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ContentChunk {
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        topic: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            topic: topic.into(),
            content: content.into(),
            tags: BTreeSet::new(),
        }
    }
}

/// Metadata about a corpus file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusMetadata {
    /// Name of the corpus
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: String,
    /// Optional version
    #[serde(default)]
    pub version: String,
}

/// A complete corpus file that can be loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusFile {
    /// Metadata about the corpus
    pub metadata: CorpusMetadata,
    /// The passages, in corpus order
    pub chunks: Vec<ContentChunk>,
}

impl CorpusFile {
    /// Load a corpus from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::FixtureLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| match e {
            BenchError::FixtureLoad { message, .. } => BenchError::FixtureLoad {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse a corpus from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BenchError::FixtureLoad {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Create a corpus file from chunks
    pub fn new(name: impl Into<String>, chunks: Vec<ContentChunk>) -> Self {
        Self {
            metadata: CorpusMetadata {
                name: name.into(),
                description: String::new(),
                version: "1.0".to_string(),
            },
            chunks,
        }
    }

    /// All chunk bodies in corpus order (for embedding)
    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.content.clone()).collect()
    }
}
