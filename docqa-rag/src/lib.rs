//! Document question answering over a local corpus.
//!
//! This crate provides:
//! - Markdown and plain-text loading with bounded concurrency
//! - Recursive character chunking with overlap
//! - Rate-limit-aware embedding and a staged, idempotent indexing pipeline
//! - Thresholded similarity retrieval with grounded and fallback prompts
//!
//! The OpenAI clients live behind the `openai` feature.

pub mod answer;
pub mod chunking;
pub mod config;
pub mod disk;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod indexer;
pub mod inmemory;
pub mod loader;
pub mod parser;
pub mod prompt;
pub mod retriever;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

pub use answer::{Answer, QueryEngine};
pub use chunking::{Chunker, RecursiveChunker, chunk_documents};
pub use config::{FreshnessPolicy, RagConfig, RagConfigBuilder};
pub use disk::DiskVectorStore;
pub use document::{Chunk, Document, IndexedRecord, RetrievedMatch, SECTION_KEY, SOURCE_KEY};
pub use embedding::{EmbeddingProvider, RateLimitedEmbedder, RetryPolicy};
pub use error::{RagError, Result};
pub use generation::{GenerationOptions, GenerativeModel};
pub use indexer::{
    BuildReport, IndexHandle, IndexOutcome, IndexState, Indexer, IndexerBuilder,
    corpus_fingerprint, index_name,
};
pub use inmemory::InMemoryVectorStore;
pub use loader::DocumentLoader;
pub use parser::{DocumentParser, MarkdownMode, MarkdownParser, ParserRegistry, PlainTextParser};
pub use prompt::{ComposedPrompt, PromptComposer, PromptKind};
pub use retriever::{Retrieval, Retriever, filter_by_threshold};
pub use vectorstore::{IndexManifest, VectorStore, cosine_similarity};
