//! Generative model trait.

use async_trait::async_trait;

use crate::config::RagConfig;
use crate::error::Result;

/// Sampling and retry settings for a completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature. `0.0` asks for deterministic output.
    pub temperature: f32,
    /// Extra attempts after the first on transient failures.
    pub max_retries: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.0, max_retries: 2 }
    }
}

impl GenerationOptions {
    /// Options taken from pipeline configuration.
    pub fn from_config(config: &RagConfig) -> Self {
        Self { max_retries: config.generation_retries, ..Self::default() }
    }
}

/// A chat model that completes a single prompt.
///
/// Implementations return [`RagError::GenerationError`](crate::RagError::GenerationError)
/// once their retries are exhausted.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{GenerationOptions, GenerativeModel};
///
/// let answer = model.complete("what is a subnet?", &GenerationOptions::default()).await?;
/// ```
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Complete `prompt` and return the model's text.
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}
