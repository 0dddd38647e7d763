//! Error types for the `docqa-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while indexing or querying a corpus.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding service rejected a request because of rate limiting.
    ///
    /// This is the only embedding failure that [`RateLimitedEmbedder`](crate::RateLimitedEmbedder)
    /// retries.
    #[error("Rate limited ({provider}): {message}")]
    RateLimited {
        /// The embedding provider that throttled the request.
        provider: String,
        /// The message reported by the service.
        message: String,
    },

    /// Rate-limit retries were exhausted.
    #[error("Rate limit exceeded: gave up after {attempts} attempts")]
    RateLimitExceeded {
        /// Total number of attempts made, including the first one.
        attempts: u32,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The generative model failed to produce an answer.
    #[error("Generation error ({model}): {message}")]
    GenerationError {
        /// The model that produced the error.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// A single file could not be parsed into documents.
    #[error("Failed to parse {}: {message}", path.display())]
    ParseError {
        /// The file that failed to parse.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the indexing pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization error while reading or writing persisted records.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Whether this error is a transient rate-limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RagError::RateLimited { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
