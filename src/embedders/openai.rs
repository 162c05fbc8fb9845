//! OpenAI embeddings provider
//!
//! OpenAI's `text-embedding-3-*` models are symmetric, so the role is not sent.

use reqwest::Client;
use serde::Serialize;

use super::http::{build_client, post_embeddings};
use super::traits::{BatchEmbedding, EmbedRole, EmbeddingProvider};
use crate::error::Result;

/// Default API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    input: &'a [String],
    model: &'a str,
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// OpenAI embeddings backend
pub struct OpenAiProvider {
    client: Client,
    name: String,
    model: String,
    api_key: String,
    base_url: String,
    dimensions: Option<usize>,
}

impl OpenAiProvider {
    /// Create a provider for the given model
    pub fn new(name: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let client = build_client(&name)?;
        Ok(Self {
            client,
            name,
            model: model.into(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            dimensions: None,
        })
    }

    /// Point the provider at a different API root (proxies, Azure-style gateways)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request shortened vectors (text-embedding-3 models only)
    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, texts: &'a [String]) -> OpenAiRequest<'a> {
        OpenAiRequest {
            input: texts,
            model: &self.model,
            encoding_format: "float",
            dimensions: self.dimensions,
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String], role: EmbedRole) -> Result<BatchEmbedding> {
        if texts.is_empty() {
            return Ok(BatchEmbedding::default());
        }
        tracing::debug!(provider = %self.name, count = texts.len(), %role, "openai embeddings request");
        let payload = self.build_request(texts);
        post_embeddings(
            &self.client,
            &self.name,
            &self.endpoint(),
            &self.api_key,
            &payload,
            texts.len(),
        )
        .await
    }
}
