//! Batch orchestration with rate-limit retry
//!
//! Splits a text list into fixed-size batches, sends them one at a time, and
//! retries rate-limited calls with exponential backoff. Batches are never
//! issued concurrently: providers quota per time window and serial requests
//! keep backoff easy to reason about.

use std::time::Duration;

use crate::embedders::{BatchEmbedding, EmbedRole, EmbeddingProvider};
use crate::error::{BenchError, ProviderError, Result};

/// Upper bound on any single backoff sleep
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

/// Decides whether an error is worth retrying
pub type RetryPredicate = fn(&BenchError) -> bool;

/// Retry behavior for provider calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied per subsequent retry
    pub growth_factor: f64,
    /// Which errors are transient
    pub is_retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    /// Tuned for providers with coarse per-minute quotas
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(25),
            growth_factor: 1.5,
            is_retryable: is_rate_limit,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    ///
    /// `initial_delay * growth_factor ^ attempt`, capped at [`MAX_RETRY_DELAY`].
    /// A negative or NaN product yields no delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.growth_factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let secs = (self.initial_delay.as_secs_f64() * factor).min(MAX_RETRY_DELAY.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

/// Default rate-limit classifier
///
/// HTTP 429, or a provider message that talks about rate limiting.
pub fn is_rate_limit(err: &BenchError) -> bool {
    match err {
        BenchError::RateLimited { .. } => true,
        BenchError::Provider { source, .. } => match source {
            ProviderError::Http { status: 429, .. } => true,
            ProviderError::Http { body, .. } => mentions_rate_limit(body),
            ProviderError::Transport(message) | ProviderError::Malformed(message) => {
                mentions_rate_limit(message)
            }
        },
        _ => false,
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("too many requests")
}

/// Async sleep, injectable so backoff is testable without real timing
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sends texts to a provider in fixed-size batches with retry
pub struct BatchEmbedder<S = TokioSleeper> {
    batch_size: usize,
    policy: RetryPolicy,
    sleeper: S,
}

impl BatchEmbedder<TokioSleeper> {
    pub fn new(batch_size: usize, policy: RetryPolicy) -> Self {
        Self::with_sleeper(batch_size, policy, TokioSleeper)
    }
}

impl<S: Sleeper> BatchEmbedder<S> {
    pub fn with_sleeper(batch_size: usize, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            batch_size: batch_size.max(1),
            policy,
            sleeper,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Number of provider calls needed for `n` texts
    pub fn batch_count(&self, n: usize) -> usize {
        n.div_ceil(self.batch_size)
    }

    /// Embed all texts, preserving input order
    ///
    /// `latency_ms` of the result is the sum over batches. Any batch failure
    /// that survives retry aborts the whole call; no partial result is
    /// returned.
    pub async fn embed_all(
        &self,
        provider: &dyn EmbeddingProvider,
        texts: &[String],
        role: EmbedRole,
    ) -> Result<BatchEmbedding> {
        let total_batches = self.batch_count(texts.len());
        let mut combined = BatchEmbedding::new(Vec::with_capacity(texts.len()), 0, 0.0);

        for (batch_idx, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::info!(
                provider = provider.name(),
                %role,
                "batch {}/{} ({} texts embedded)",
                batch_idx + 1,
                total_batches,
                combined.len()
            );

            let result = self.embed_with_retry(provider, batch, role).await?;

            if result.len() != batch.len() {
                return Err(BenchError::provider(
                    provider.name(),
                    ProviderError::Malformed(format!(
                        "batch {} returned {} vectors for {} texts",
                        batch_idx + 1,
                        result.len(),
                        batch.len()
                    )),
                ));
            }
            if let Some(expected) = combined.dimensions().or(result.dimensions()) {
                if let Some(bad) = result.vectors.iter().find(|v| v.len() != expected) {
                    return Err(BenchError::DimensionMismatch {
                        left: expected,
                        right: bad.len(),
                    });
                }
            }

            combined.tokens_used += result.tokens_used;
            combined.latency_ms += result.latency_ms;
            combined.vectors.extend(result.vectors);
        }

        Ok(combined)
    }

    /// Call the provider once, retrying rate-limited failures with backoff
    ///
    /// Non-retryable errors propagate immediately. After `max_retries`
    /// retries the last error is returned.
    pub async fn embed_with_retry(
        &self,
        provider: &dyn EmbeddingProvider,
        batch: &[String],
        role: EmbedRole,
    ) -> Result<BatchEmbedding> {
        let mut attempt: u32 = 0;
        loop {
            match provider.embed(batch, role).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !(self.policy.is_retryable)(&err) {
                        return Err(err);
                    }
                    if attempt >= self.policy.max_retries {
                        tracing::warn!(
                            provider = provider.name(),
                            "giving up after {} retries: {}",
                            attempt,
                            err
                        );
                        return Err(err);
                    }
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        provider = provider.name(),
                        "rate limited (retry {}/{}), waiting {:.1}s: {}",
                        attempt + 1,
                        self.policy.max_retries,
                        delay.as_secs_f64(),
                        err
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
