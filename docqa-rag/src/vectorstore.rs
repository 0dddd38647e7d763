//! Vector store trait for persisting records and searching by similarity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{IndexedRecord, RetrievedMatch};
use crate::error::Result;

/// Summary written when an index is committed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    /// Embedding dimensionality of every record.
    pub dimensions: usize,
    /// Number of records in the index.
    pub record_count: usize,
    /// Number of batches appended while building.
    pub batch_count: usize,
    /// Chunk size used to build the index.
    pub chunk_size: usize,
    /// Chunk overlap used to build the index.
    pub chunk_overlap: usize,
    /// Corpus fingerprint, present when built under a content-hash freshness policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// A storage backend for named indexes of embedded records.
///
/// Building an index is staged: [`create_collection`](VectorStore::create_collection)
/// opens a fresh staging area, [`append`](VectorStore::append) adds batches to
/// it, and [`commit_collection`](VectorStore::commit_collection) publishes it.
/// Only committed indexes are visible to [`collection_exists`](VectorStore::collection_exists)
/// and [`search`](VectorStore::search). Appended batches of an uncommitted
/// index stay in the staging area until the next `create_collection` for the
/// same name discards them.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, IndexManifest, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// store.append("docs", &records).await?;
/// store.commit_collection("docs", &manifest).await?;
/// let matches = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Whether a committed index with this name exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Start building an index, discarding any leftover staging area.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Append records to the index being built, preserving their order.
    async fn append(&self, name: &str, records: &[IndexedRecord]) -> Result<()>;

    /// Publish the index being built under `name`, replacing any committed
    /// index of that name. Until this returns, searches see the previous one.
    async fn commit_collection(&self, name: &str, manifest: &IndexManifest) -> Result<()>;

    /// Delete a committed index and any staging area for it. No-op if absent.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// The manifest of a committed index, if it exists.
    async fn manifest(&self, name: &str) -> Result<Option<IndexManifest>>;

    /// Search for the `top_k` most similar records to the given embedding.
    ///
    /// Returns matches ordered by descending similarity score.
    async fn search(
        &self,
        name: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedMatch>>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Score every record against `embedding` and keep the best `top_k`.
pub(crate) fn rank<'a>(
    records: impl Iterator<Item = &'a IndexedRecord>,
    embedding: &[f32],
    top_k: usize,
) -> Vec<RetrievedMatch> {
    let mut scored: Vec<RetrievedMatch> = records
        .map(|record| RetrievedMatch {
            score: cosine_similarity(&record.embedding, embedding),
            record: record.clone(),
        })
        .collect();

    // Stable sort keeps insertion order among equal scores. NaN ranks last.
    let key = |m: &RetrievedMatch| if m.score.is_nan() { f32::NEG_INFINITY } else { m.score };
    scored.sort_by(|a, b| key(b).total_cmp(&key(a)));
    scored.truncate(top_k);
    scored
}
