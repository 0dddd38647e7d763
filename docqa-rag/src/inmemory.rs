//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by
//! `HashMap`s protected by a `tokio::sync::RwLock`. It is suitable for tests
//! and short-lived processes; nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{IndexedRecord, RetrievedMatch};
use crate::error::{RagError, Result};
use crate::vectorstore::{IndexManifest, VectorStore, rank};

#[derive(Debug, Default, Clone)]
struct Collection {
    manifest: IndexManifest,
    records: Vec<IndexedRecord>,
}

#[derive(Debug, Default)]
struct State {
    committed: HashMap<String, Collection>,
    staging: HashMap<String, Collection>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    state: RwLock<State>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records staged for an uncommitted index.
    pub async fn staged_len(&self, name: &str) -> usize {
        self.state.read().await.staging.get(name).map_or(0, |c| c.records.len())
    }
}

fn missing(name: &str, what: &str) -> RagError {
    RagError::VectorStoreError {
        backend: "InMemory".to_string(),
        message: format!("{what} '{name}' does not exist"),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.read().await.committed.contains_key(name))
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut state = self.state.write().await;
        let collection = Collection {
            manifest: IndexManifest { dimensions, ..IndexManifest::default() },
            records: Vec::new(),
        };
        state.staging.insert(name.to_string(), collection);
        Ok(())
    }

    async fn append(&self, name: &str, records: &[IndexedRecord]) -> Result<()> {
        let mut state = self.state.write().await;
        let collection = state.staging.get_mut(name).ok_or_else(|| missing(name, "staging area"))?;
        collection.records.extend_from_slice(records);
        Ok(())
    }

    async fn commit_collection(&self, name: &str, manifest: &IndexManifest) -> Result<()> {
        let mut state = self.state.write().await;
        let mut collection =
            state.staging.remove(name).ok_or_else(|| missing(name, "staging area"))?;
        collection.manifest = manifest.clone();
        state.committed.insert(name.to_string(), collection);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.committed.remove(name);
        state.staging.remove(name);
        Ok(())
    }

    async fn manifest(&self, name: &str) -> Result<Option<IndexManifest>> {
        Ok(self.state.read().await.committed.get(name).map(|c| c.manifest.clone()))
    }

    async fn search(
        &self,
        name: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedMatch>> {
        let state = self.state.read().await;
        let collection = state.committed.get(name).ok_or_else(|| missing(name, "collection"))?;
        Ok(rank(collection.records.iter(), embedding, top_k))
    }
}
