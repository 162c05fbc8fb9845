//! Shared HTTP plumbing for OpenAI-style embedding endpoints
//!
//! Both supported providers answer with
//! `{ data: [{ embedding, index }], usage: { total_tokens } }`. The raw body is
//! parsed into a strict shape here and re-sorted by `index` before anything
//! else in the pipeline sees it.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::{measure_async, BatchEmbedding};
use crate::error::{BenchError, ProviderError, Result};

/// Per-request timeout for embedding calls
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Maximum characters of an error body kept in an error message
const ERROR_BODY_MAX_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

/// Build the HTTP client shared by a provider's calls
pub(crate) fn build_client(provider: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| BenchError::provider(provider, ProviderError::Transport(e.to_string())))
}

/// POST an embeddings request and normalize the answer
pub(crate) async fn post_embeddings<P: Serialize + ?Sized>(
    client: &Client,
    provider: &str,
    url: &str,
    api_key: &str,
    payload: &P,
    expected: usize,
) -> Result<BatchEmbedding> {
    let (outcome, duration) = measure_async(async {
        let response = client
            .post(url)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| BenchError::provider(provider, ProviderError::Transport(e.to_string())))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BenchError::provider(provider, ProviderError::Transport(e.to_string())))?;
        Ok::<_, BenchError>((status, body))
    })
    .await;
    let (status, body) = outcome?;

    if !status.is_success() {
        return Err(classify_status(provider, status, &body));
    }

    let (vectors, tokens_used) = parse_embeddings_response(provider, &body, expected)?;
    tracing::debug!(
        provider,
        count = vectors.len(),
        tokens_used,
        latency_ms = duration.as_secs_f64() * 1000.0,
        "embedding batch received"
    );
    Ok(BatchEmbedding::new(
        vectors,
        tokens_used,
        duration.as_secs_f64() * 1000.0,
    ))
}

/// Map a non-2xx response to an error the retry policy can classify
pub(crate) fn classify_status(provider: &str, status: StatusCode, body: &str) -> BenchError {
    let body = truncate_body(body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        return BenchError::RateLimited {
            provider: provider.to_string(),
            message: body,
        };
    }
    BenchError::provider(
        provider,
        ProviderError::Http {
            status: status.as_u16(),
            body,
        },
    )
}

/// Parse a response body into vectors in input order plus token usage
///
/// Indices must be exactly `0..expected` (in any order) and every vector must
/// have the same length.
pub(crate) fn parse_embeddings_response(
    provider: &str,
    body: &str,
    expected: usize,
) -> Result<(Vec<Vec<f32>>, u64)> {
    let malformed = |message: String| BenchError::provider(provider, ProviderError::Malformed(message));

    let mut response: EmbeddingsResponse =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    if response.data.len() != expected {
        return Err(malformed(format!(
            "expected {} embeddings, got {}",
            expected,
            response.data.len()
        )));
    }

    response.data.sort_by_key(|d| d.index);
    for (position, item) in response.data.iter().enumerate() {
        if item.index != position {
            return Err(malformed(format!(
                "embedding indices are not a permutation of 0..{} (found {} at position {})",
                expected, item.index, position
            )));
        }
    }

    if let Some(first) = response.data.first() {
        let dims = first.embedding.len();
        if dims == 0 {
            return Err(malformed("empty embedding vector".to_string()));
        }
        if let Some(bad) = response.data.iter().find(|d| d.embedding.len() != dims) {
            return Err(malformed(format!(
                "embedding {} has {} dimensions, expected {}",
                bad.index,
                bad.embedding.len(),
                dims
            )));
        }
    }

    let vectors = response.data.into_iter().map(|d| d.embedding).collect();
    Ok((vectors, response.usage.total_tokens))
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > ERROR_BODY_MAX_CHARS {
        let head: String = trimmed.chars().take(ERROR_BODY_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}
