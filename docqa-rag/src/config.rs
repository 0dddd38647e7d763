//! Configuration for the indexing and query pipeline.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::parser::MarkdownMode;

/// How an existing index is judged to be up to date.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessPolicy {
    /// An existing index is always reused, even if the corpus changed.
    #[default]
    ExistenceOnly,
    /// An existing index is rebuilt when the corpus fingerprint differs from
    /// the one recorded at commit time.
    ContentHash,
}

/// Configuration parameters for the pipeline.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Root directory of the corpus.
    pub doc_dir: String,
    /// Prefix of the index name; the corpus identity is appended to it.
    pub index_path_prefix: String,
    /// Embedding requests allowed per minute; sets the backoff unit.
    pub requests_per_minute: u32,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Maximum number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks embedded and persisted per batch.
    pub batch_size: usize,
    /// Minimum similarity score for a match to be used as context.
    pub similarity_threshold: f32,
    /// Number of nearest records requested per query.
    pub retrieval_k: usize,
    /// Total embedding attempts when the service is rate limiting.
    pub retry_count: u32,
    /// Extra attempts on transient generation failures.
    pub generation_retries: u32,
    /// Upper bound on files loaded concurrently.
    pub max_concurrent_loads: usize,
    /// How an existing index is judged to be up to date.
    pub freshness: FreshnessPolicy,
    /// Whether markdown files become one document or one per section.
    pub markdown_mode: MarkdownMode,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            doc_dir: "./docs".to_string(),
            index_path_prefix: "./index".to_string(),
            requests_per_minute: 3,
            chunk_size: 500,
            chunk_overlap: 50,
            batch_size: 5000,
            similarity_threshold: 0.22,
            retrieval_k: 10,
            retry_count: 3,
            generation_retries: 2,
            max_concurrent_loads: 8,
            freshness: FreshnessPolicy::default(),
            markdown_mode: MarkdownMode::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse a configuration from TOML text and validate it.
    ///
    /// Unknown keys and tables are ignored so that the same file can carry
    /// settings for other components.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RagConfig = toml::from_str(text)
            .map_err(|e| RagError::ConfigError(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RagError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// The wait unit between rate-limited embedding attempts.
    pub fn base_wait(&self) -> Duration {
        Duration::from_secs_f64(60.0 / f64::from(self.requests_per_minute.max(1)))
    }

    /// The index name derived from the prefix and the corpus directory.
    pub fn index_name(&self) -> String {
        crate::indexer::index_name(&self.index_path_prefix, &self.doc_dir)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.doc_dir.trim().is_empty() {
            return Err(RagError::ConfigError("doc_dir must not be empty".to_string()));
        }
        if self.index_path_prefix.trim().is_empty() {
            return Err(RagError::ConfigError("index_path_prefix must not be empty".to_string()));
        }
        if self.requests_per_minute == 0 {
            return Err(RagError::ConfigError(
                "requests_per_minute must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.batch_size == 0 {
            return Err(RagError::ConfigError("batch_size must be greater than zero".to_string()));
        }
        if !self.similarity_threshold.is_finite() {
            return Err(RagError::ConfigError("similarity_threshold must be finite".to_string()));
        }
        if self.retrieval_k == 0 {
            return Err(RagError::ConfigError("retrieval_k must be greater than zero".to_string()));
        }
        if self.retry_count == 0 {
            return Err(RagError::ConfigError("retry_count must be greater than zero".to_string()));
        }
        if self.max_concurrent_loads == 0 {
            return Err(RagError::ConfigError(
                "max_concurrent_loads must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the corpus root directory.
    pub fn doc_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.doc_dir = dir.into();
        self
    }

    /// Set the index name prefix.
    pub fn index_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.index_path_prefix = prefix.into();
        self
    }

    /// Set the embedding request budget per minute.
    pub fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.config.requests_per_minute = rpm;
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks per embedding batch.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the number of nearest records requested per query.
    pub fn retrieval_k(mut self, k: usize) -> Self {
        self.config.retrieval_k = k;
        self
    }

    /// Set the total embedding attempts under rate limiting.
    pub fn retry_count(mut self, count: u32) -> Self {
        self.config.retry_count = count;
        self
    }

    /// Set the extra attempts on transient generation failures.
    pub fn generation_retries(mut self, retries: u32) -> Self {
        self.config.generation_retries = retries;
        self
    }

    /// Set the upper bound on concurrently loaded files.
    pub fn max_concurrent_loads(mut self, n: usize) -> Self {
        self.config.max_concurrent_loads = n;
        self
    }

    /// Set the freshness policy for existing indexes.
    pub fn freshness(mut self, policy: FreshnessPolicy) -> Self {
        self.config.freshness = policy;
        self
    }

    /// Set how markdown files are split into documents.
    pub fn markdown_mode(mut self, mode: MarkdownMode) -> Self {
        self.config.markdown_mode = mode;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any parameter is out of range,
    /// for example when `chunk_overlap >= chunk_size`.
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
