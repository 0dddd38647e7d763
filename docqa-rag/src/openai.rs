//! OpenAI embedding provider and chat model.
//!
//! This module is only available when the `openai` feature is enabled. Both
//! clients take their API key by value; nothing is read from the environment.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationOptions, GenerativeModel};

/// The default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

/// Backoff before retry `attempt` (1-based) of a chat request, capped at 16s.
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * (1 << attempt.min(5)))
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn require_key(api_key: String, kind: impl FnOnce(String) -> RagError) -> Result<String> {
    if api_key.trim().is_empty() {
        return Err(kind("API key must not be empty".into()));
    }
    Ok(api_key)
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// HTTP 429 responses are reported as [`RagError::RateLimited`] so that
/// [`RateLimitedEmbedder`](crate::RateLimitedEmbedder) can pace the retries.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new(api_key)?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = require_key(api_key.into(), |message| RagError::EmbeddingError {
            provider: "OpenAI".into(),
            message,
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the provider at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn failure(message: String) -> RagError {
        RagError::EmbeddingError { provider: "OpenAI".into(), message }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::failure("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = "OpenAI",
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "request failed");
                Self::failure(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response.text().await.unwrap_or_default());
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(RagError::RateLimited { provider: "OpenAI".into(), message: detail });
            }
            error!(provider = "OpenAI", %status, "API error");
            return Err(Self::failure(format!("API returned {status}: {detail}")));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse response");
            Self::failure(format!("failed to parse response: {e}"))
        })?;

        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != texts.len() {
            return Err(Self::failure(format!(
                "API returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`GenerativeModel`] backed by the OpenAI chat completions API.
///
/// Transient failures (HTTP 429, 5xx, timeouts, connection errors) are
/// retried with exponential backoff up to
/// [`GenerationOptions::max_retries`] extra attempts.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIChatModel;
///
/// let model = OpenAIChatModel::new(api_key)?.with_model("gpt-4o");
/// let text = model.complete(&prompt, &GenerationOptions::default()).await?;
/// ```
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIChatModel {
    /// Create a chat model with the given API key, using `gpt-4o`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = require_key(api_key.into(), |message| RagError::GenerationError {
            model: DEFAULT_CHAT_MODEL.into(),
            message,
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_CHAT_MODEL.into(),
        })
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the model at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn failure(&self, message: String) -> RagError {
        RagError::GenerationError { model: self.model.clone(), message }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerativeModel for OpenAIChatModel {
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: options.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);

        let mut attempt = 0u32;
        loop {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(&request).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: ChatResponse = resp
                            .json()
                            .await
                            .map_err(|e| self.failure(format!("failed to parse response: {e}")))?;
                        return parsed
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|choice| choice.message.content)
                            .ok_or_else(|| self.failure("response contained no message".into()));
                    }

                    let detail = error_detail(resp.text().await.unwrap_or_default());
                    if should_retry(status) && attempt < options.max_retries {
                        attempt += 1;
                        warn!(
                            model = %self.model,
                            %status,
                            attempt,
                            "chat request failed, retrying"
                        );
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    error!(model = %self.model, %status, "chat API error");
                    return Err(self.failure(format!("API returned {status}: {detail}")));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt < options.max_retries {
                        attempt += 1;
                        warn!(
                            model = %self.model,
                            error = %err,
                            attempt,
                            "chat request failed, retrying"
                        );
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    error!(model = %self.model, error = %err, "chat request failed");
                    return Err(self.failure(format!("request failed: {err}")));
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
