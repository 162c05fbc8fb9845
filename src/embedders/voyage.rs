//! Voyage AI embeddings provider
//!
//! Voyage models are asymmetric: passages and queries are encoded differently,
//! selected by the `input_type` request field.

use reqwest::Client;
use serde::Serialize;

use super::http::{build_client, post_embeddings};
use super::traits::{BatchEmbedding, EmbedRole, EmbeddingProvider};
use crate::error::Result;

/// Default API base URL
pub const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";

#[derive(Debug, Serialize)]
struct VoyageRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: EmbedRole,
}

/// Voyage AI embeddings backend
pub struct VoyageProvider {
    client: Client,
    name: String,
    model: String,
    api_key: String,
    base_url: String,
}

impl VoyageProvider {
    /// Create a provider for the given model
    pub fn new(name: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let client = build_client(&name)?;
        Ok(Self {
            client,
            name,
            model: model.into(),
            api_key: api_key.into(),
            base_url: VOYAGE_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, texts: &'a [String], role: EmbedRole) -> VoyageRequest<'a> {
        VoyageRequest {
            input: texts,
            model: &self.model,
            input_type: role,
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for VoyageProvider {
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
        tracing::debug!(provider = %self.name, count = texts.len(), %role, "voyage embeddings request");
        let payload = self.build_request(texts, role);
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
