//! Embedding providers and the rate-limit-aware embedding client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. A backend that throttles a request must report it as
/// [`RagError::RateLimited`] so that [`RateLimitedEmbedder`] can retry it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The returned vectors must be in input order. The default
    /// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
    /// override it if the backend supports native batching.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Retry schedule for rate-limited embedding calls.
///
/// After failed attempt `n` (1-based) the client waits `base_wait * n`
/// before the next one. No wait follows the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// The wait unit, `60s / requests_per_minute`.
    pub base_wait: Duration,
}

impl RetryPolicy {
    /// Create a policy from a requests-per-minute budget.
    pub fn from_rpm(requests_per_minute: u32, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_wait: Duration::from_secs_f64(60.0 / f64::from(requests_per_minute.max(1))),
        }
    }

    /// Create a policy from pipeline configuration.
    pub fn from_config(config: &RagConfig) -> Self {
        Self { max_attempts: config.retry_count, base_wait: config.base_wait() }
    }

    /// The wait after failed attempt `attempt` (1-based).
    pub fn wait_after(&self, attempt: u32) -> Duration {
        self.base_wait * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_rpm(3, 3)
    }
}

/// Embedding client that retries rate-limited calls.
///
/// Only [`RagError::RateLimited`] is retried; every other provider error is
/// returned as is. The client checks that the provider returned exactly one
/// vector per input, since callers zip texts and vectors positionally.
#[derive(Clone)]
pub struct RateLimitedEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl RateLimitedEmbedder {
    /// Wrap a provider with the given retry policy.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Dimensionality of the underlying provider.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed `texts`, returning one vector per text in the same order.
    ///
    /// # Errors
    ///
    /// - [`RagError::RateLimitExceeded`] once every attempt was rate limited.
    /// - [`RagError::EmbeddingError`] if the provider returned the wrong number of vectors.
    /// - Any non-rate-limit provider error, unchanged.
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.embed_batch(texts).await {
                Ok(vectors) => {
                    if vectors.len() != texts.len() {
                        error!(
                            expected = texts.len(),
                            actual = vectors.len(),
                            "embedding count mismatch"
                        );
                        return Err(RagError::EmbeddingError {
                            provider: "client".to_string(),
                            message: format!(
                                "provider returned {} vectors for {} inputs",
                                vectors.len(),
                                texts.len()
                            ),
                        });
                    }
                    debug!(attempt, count = vectors.len(), "embedded batch");
                    return Ok(vectors);
                }
                Err(e) if e.is_rate_limited() => {
                    if attempt >= max_attempts {
                        error!(attempts = attempt, error = %e, "rate limit retries exhausted");
                        return Err(RagError::RateLimitExceeded { attempts: attempt });
                    }
                    let wait = self.policy.wait_after(attempt);
                    warn!(
                        attempt,
                        wait_secs = wait.as_secs_f64(),
                        error = %e,
                        "rate limit exceeded, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Embed a single text, such as a query.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text]).await?.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: "client".to_string(),
            message: "provider returned no vector".to_string(),
        })
    }
}
