//! Corpus indexing pipeline.
//!
//! The [`Indexer`] turns a directory of documents into a committed index:
//! check for an existing index → discover files → load → split → embed and
//! persist batch by batch → commit. An existing index is reused without any
//! embedding calls.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{DiskVectorStore, IndexOutcome, Indexer, RagConfig};
//!
//! let indexer = Indexer::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(DiskVectorStore::new(".")))
//!     .build()?;
//!
//! match indexer.run().await? {
//!     IndexOutcome::Ready(handle) => println!("{} records", handle.record_count()),
//!     IndexOutcome::Empty => println!("nothing to index"),
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::chunking::{Chunker, RecursiveChunker, chunk_documents};
use crate::config::{FreshnessPolicy, RagConfig};
use crate::document::{IndexedRecord, RetrievedMatch};
use crate::embedding::{EmbeddingProvider, RateLimitedEmbedder, RetryPolicy};
use crate::error::{RagError, Result};
use crate::loader::DocumentLoader;
use crate::parser::ParserRegistry;
use crate::vectorstore::{IndexManifest, VectorStore};

/// Derive the index name for a corpus.
///
/// A leading `./` and any leading or trailing separators are removed from
/// `doc_dir`; the remaining separators become `-`.
pub fn index_name(prefix: &str, doc_dir: &str) -> String {
    let corpus = doc_dir.strip_prefix("./").unwrap_or(doc_dir);
    let corpus: String = corpus
        .trim_matches(['/', '\\'])
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    format!("{prefix}-{corpus}")
}

/// Fingerprint a corpus: file paths relative to `root`, their bytes, and the
/// chunking parameters.
pub async fn corpus_fingerprint(
    root: &Path,
    files: &[PathBuf],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(format!("chunk_size={chunk_size};chunk_overlap={chunk_overlap};"));
    for file in files {
        let relative = file.strip_prefix(root).unwrap_or(file);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(tokio::fs::read(file).await?);
        hasher.update([0u8]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Stages of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Looking for a committed index.
    CheckExisting,
    /// Enumerating corpus files.
    Discover,
    /// Parsing files into documents.
    Load,
    /// Chunking documents.
    Split,
    /// Embedding and persisting chunk batches.
    BatchEmbedPersist,
    /// The index is ready to query.
    Done,
    /// No files or no text were found; no index was produced.
    Empty,
}

/// Counts gathered while building an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Files discovered under the corpus root.
    pub files: usize,
    /// Documents produced by the loader.
    pub documents: usize,
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Batches embedded and persisted.
    pub batches: usize,
}

/// A handle to a committed, queryable index.
#[derive(Clone)]
pub struct IndexHandle {
    name: String,
    store: Arc<dyn VectorStore>,
    manifest: Option<IndexManifest>,
    report: Option<BuildReport>,
}

impl IndexHandle {
    /// Open a committed index by name.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if no committed index has this name.
    pub async fn open(store: Arc<dyn VectorStore>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !store.collection_exists(&name).await? {
            return Err(RagError::VectorStoreError {
                backend: "handle".to_string(),
                message: format!("index '{name}' does not exist"),
            });
        }
        let manifest = store.manifest(&name).await?;
        Ok(Self { name, store, manifest, report: None })
    }

    /// The index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The manifest recorded at commit time, if the store keeps one.
    pub fn manifest(&self) -> Option<&IndexManifest> {
        self.manifest.as_ref()
    }

    /// Number of records in the index, as recorded at commit time.
    pub fn record_count(&self) -> usize {
        self.manifest.as_ref().map_or(0, |m| m.record_count)
    }

    /// Whether an existing index was reused instead of built.
    pub fn reused(&self) -> bool {
        self.report.is_none()
    }

    /// Counts from the build, when this run built the index.
    pub fn report(&self) -> Option<BuildReport> {
        self.report
    }

    /// Search the index for the `top_k` records nearest to `embedding`.
    pub async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RetrievedMatch>> {
        self.store.search(&self.name, embedding, top_k).await
    }
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("name", &self.name)
            .field("manifest", &self.manifest)
            .field("report", &self.report)
            .finish()
    }
}

/// Result of an indexing run.
#[derive(Debug, Clone)]
pub enum IndexOutcome {
    /// The index is committed and queryable.
    Ready(IndexHandle),
    /// The corpus held no indexable text; no index exists.
    Empty,
}

impl IndexOutcome {
    /// The handle, if an index is ready.
    pub fn into_handle(self) -> Option<IndexHandle> {
        match self {
            IndexOutcome::Ready(handle) => Some(handle),
            IndexOutcome::Empty => None,
        }
    }
}

/// The corpus indexing pipeline. Construct one via [`Indexer::builder()`].
pub struct Indexer {
    config: RagConfig,
    embedder: RateLimitedEmbedder,
    store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    loader: DocumentLoader,
}

impl Indexer {
    /// Create a new [`IndexerBuilder`].
    pub fn builder() -> IndexerBuilder {
        IndexerBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The embedding client, shared with retrieval so queries use the same space.
    pub fn embedder(&self) -> &RateLimitedEmbedder {
        &self.embedder
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// The name of the index this indexer builds.
    pub fn index_name(&self) -> String {
        self.config.index_name()
    }

    /// Run the pipeline, reusing an existing index when there is one.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if a batch fails to embed or persist,
    /// and propagates discovery and store errors. Batches persisted before the
    /// failure stay in the store's staging area; the index is not committed,
    /// and a previously committed index of the same name stays in use.
    pub async fn run(&self) -> Result<IndexOutcome> {
        let name = self.index_name();
        let span = info_span!("index", index = %name);
        self.run_inner(name).instrument(span).await
    }

    async fn run_inner(&self, name: String) -> Result<IndexOutcome> {
        let root = PathBuf::from(&self.config.doc_dir);

        enter(IndexState::CheckExisting);
        let mut discovered: Option<(Vec<PathBuf>, Option<String>)> = None;
        if self.store.collection_exists(&name).await? {
            match self.config.freshness {
                FreshnessPolicy::ExistenceOnly => {
                    info!("index already exists, loading it");
                    return self.reuse(name).await;
                }
                FreshnessPolicy::ContentHash => {
                    enter(IndexState::Discover);
                    let files = self.loader.discover(&root)?;
                    if files.is_empty() {
                        warn!("corpus is now empty, removing the stale index");
                        self.store.delete_collection(&name).await?;
                        return Ok(empty("no documents found in corpus directory"));
                    }
                    let fingerprint = self.fingerprint(&root, &files).await?;
                    let recorded = self.store.manifest(&name).await?.and_then(|m| m.fingerprint);
                    if recorded.as_deref() == Some(fingerprint.as_str()) {
                        info!("index is up to date, loading it");
                        return self.reuse(name).await;
                    }
                    warn!("corpus changed since the index was built, rebuilding");
                    discovered = Some((files, Some(fingerprint)));
                }
            }
        } else {
            info!("no existing index found, indexing");
        }

        let replacing = discovered.is_some();
        let (files, fingerprint) = match discovered {
            Some(found) => found,
            None => {
                enter(IndexState::Discover);
                let files = self.loader.discover(&root)?;
                if files.is_empty() {
                    return Ok(empty("no documents found in corpus directory"));
                }
                let fingerprint = match self.config.freshness {
                    FreshnessPolicy::ContentHash => Some(self.fingerprint(&root, &files).await?),
                    FreshnessPolicy::ExistenceOnly => None,
                };
                (files, fingerprint)
            }
        };
        info!(files = files.len(), "discovered files");

        enter(IndexState::Load);
        let documents = self.loader.load(&files).await;

        enter(IndexState::Split);
        let chunks = chunk_documents(self.chunker.as_ref(), &documents);
        info!(documents = documents.len(), chunks = chunks.len(), "split documents");
        if chunks.is_empty() {
            if replacing {
                warn!("corpus no longer has text to index, removing the stale index");
                self.store.delete_collection(&name).await?;
            }
            return Ok(empty("corpus produced no text to index"));
        }

        enter(IndexState::BatchEmbedPersist);
        let batch_size = self.config.batch_size.max(1);
        let batch_count = chunks.len().div_ceil(batch_size);
        let mut dimensions = self.embedder.dimensions();
        self.store.create_collection(&name, dimensions).await?;

        for (i, batch) in chunks.chunks(batch_size).enumerate() {
            let batch_number = i + 1;
            info!(batch = batch_number, of = batch_count, size = batch.len(), "processing batch");

            let texts: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
            let vectors = self.embedder.embed(&texts).await.map_err(|e| {
                error!(batch = batch_number, error = %e, "embedding failed, aborting");
                RagError::PipelineError(format!(
                    "batch {batch_number}/{batch_count} failed to embed: {e}"
                ))
            })?;
            if let Some(first) = vectors.first() {
                dimensions = first.len();
            }

            let records: Vec<IndexedRecord> = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, embedding)| chunk.into_record(embedding))
                .collect();

            self.store.append(&name, &records).await.map_err(|e| {
                error!(batch = batch_number, error = %e, "persisting batch failed, aborting");
                RagError::PipelineError(format!(
                    "batch {batch_number}/{batch_count} failed to persist: {e}"
                ))
            })?;
        }

        let manifest = IndexManifest {
            dimensions,
            record_count: chunks.len(),
            batch_count,
            chunk_size: self.config.chunk_size,
            chunk_overlap: self.config.chunk_overlap,
            fingerprint,
        };
        self.store.commit_collection(&name, &manifest).await?;

        enter(IndexState::Done);
        info!(records = manifest.record_count, batches = batch_count, "indexing complete");
        let report = BuildReport {
            files: files.len(),
            documents: documents.len(),
            chunks: chunks.len(),
            batches: batch_count,
        };
        Ok(IndexOutcome::Ready(IndexHandle {
            name,
            store: Arc::clone(&self.store),
            manifest: Some(manifest),
            report: Some(report),
        }))
    }

    async fn reuse(&self, name: String) -> Result<IndexOutcome> {
        enter(IndexState::Done);
        Ok(IndexOutcome::Ready(IndexHandle::open(Arc::clone(&self.store), name).await?))
    }

    async fn fingerprint(&self, root: &Path, files: &[PathBuf]) -> Result<String> {
        corpus_fingerprint(root, files, self.config.chunk_size, self.config.chunk_overlap).await
    }
}

fn enter(state: IndexState) {
    debug!(?state, "indexer state");
}

fn empty(reason: &str) -> IndexOutcome {
    enter(IndexState::Empty);
    warn!(reason, "no index produced");
    IndexOutcome::Empty
}

/// Builder for constructing an [`Indexer`].
///
/// `config`, `embedding_provider`, and `vector_store` are required. The
/// chunker, loader, and retry policy default to ones derived from the config.
#[derive(Default)]
pub struct IndexerBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    parsers: Option<ParserRegistry>,
    retry_policy: Option<RetryPolicy>,
}

impl IndexerBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Override the chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the parser registry.
    pub fn parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = Some(parsers);
        self
    }

    /// Override the rate-limit retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the [`Indexer`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<Indexer> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;

        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        });
        let parsers =
            self.parsers.unwrap_or_else(|| ParserRegistry::with_defaults(config.markdown_mode));
        let policy = self.retry_policy.unwrap_or_else(|| RetryPolicy::from_config(&config));

        Ok(Indexer {
            loader: DocumentLoader::new(parsers, config.max_concurrent_loads),
            embedder: RateLimitedEmbedder::new(embedding_provider, policy),
            store,
            chunker,
            config,
        })
    }
}
