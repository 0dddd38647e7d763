//! On-disk vector store.
//!
//! Each committed index is a directory holding `manifest.json` and one
//! `segment-NNNNN.jsonl` file per appended batch, one record per line.
//! While an index is being built its files live in a sibling
//! `<name>.partial` directory, which is renamed into place on commit, so the
//! final directory exists only for complete indexes. Committing over an
//! existing index first moves it aside to `<name>.old` and removes it once
//! the new directory is in place.
//!
//! Search is a linear cosine-similarity scan. Committed indexes are loaded
//! once and cached; they are never modified afterwards, so concurrent
//! searches are safe.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::{IndexedRecord, RetrievedMatch};
use crate::error::{RagError, Result};
use crate::vectorstore::{IndexManifest, VectorStore, rank};

const MANIFEST_FILE: &str = "manifest.json";
const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".jsonl";
const STAGING_SUFFIX: &str = ".partial";
const RETIRED_SUFFIX: &str = ".old";

struct LoadedIndex {
    manifest: IndexManifest,
    records: Vec<IndexedRecord>,
}

/// A vector store persisting each index as a directory under a root path.
///
/// Index names are joined onto the root, so a name such as
/// `./index-virtual-network` with root `.` maps to that relative directory.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{DiskVectorStore, VectorStore};
///
/// let store = DiskVectorStore::new(".");
/// if store.collection_exists("./index-docs").await? {
///     let matches = store.search("./index-docs", &query, 10).await?;
/// }
/// ```
pub struct DiskVectorStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<LoadedIndex>>>,
}

impl DiskVectorStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), cache: RwLock::new(HashMap::new()) }
    }

    /// The directory of the committed index `name`.
    pub fn index_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// The staging directory used while `name` is being built.
    pub fn staging_dir(&self, name: &str) -> PathBuf {
        self.sibling_dir(name, STAGING_SUFFIX)
    }

    /// Where a replaced index is moved while its successor is renamed in.
    fn retired_dir(&self, name: &str) -> PathBuf {
        self.sibling_dir(name, RETIRED_SUFFIX)
    }

    fn sibling_dir(&self, name: &str, suffix: &str) -> PathBuf {
        let mut dir: OsString = self.index_dir(name).into_os_string();
        dir.push(suffix);
        PathBuf::from(dir)
    }

    async fn load(&self, name: &str) -> Result<Arc<LoadedIndex>> {
        if let Some(index) = self.cache.read().await.get(name) {
            return Ok(Arc::clone(index));
        }

        let dir = self.index_dir(name);
        let manifest = read_manifest(&dir).await?.ok_or_else(|| RagError::VectorStoreError {
            backend: "Disk".to_string(),
            message: format!("index '{name}' does not exist"),
        })?;

        let mut records = Vec::with_capacity(manifest.record_count);
        for segment in segment_files(&dir).await? {
            let text = tokio::fs::read_to_string(&segment).await?;
            for line in text.lines().filter(|line| !line.trim().is_empty()) {
                records.push(serde_json::from_str::<IndexedRecord>(line)?);
            }
        }

        if records.len() != manifest.record_count {
            warn!(
                index = name,
                expected = manifest.record_count,
                actual = records.len(),
                "record count differs from manifest"
            );
        }
        debug!(index = name, records = records.len(), "loaded index");

        let loaded = Arc::new(LoadedIndex { manifest, records });
        self.cache.write().await.insert(name.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }
}

impl std::fmt::Debug for DiskVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskVectorStore").field("root", &self.root).finish()
    }
}

async fn read_manifest(dir: &Path) -> Result<Option<IndexManifest>> {
    let path = dir.join(MANIFEST_FILE);
    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }
    let text = tokio::fs::read_to_string(&path).await?;
    Ok(Some(serde_json::from_str(&text)?))
}

/// Segment files in `dir`, in append order.
async fn segment_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut segments = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(SEGMENT_PREFIX) && name.ends_with(SEGMENT_SUFFIX) {
            segments.push(entry.path());
        }
    }
    // Zero-padded names sort in append order.
    segments.sort();
    Ok(segments)
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl VectorStore for DiskVectorStore {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.index_dir(name)).await?)
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let staging = self.staging_dir(name);
        if tokio::fs::try_exists(&staging).await? {
            warn!(index = name, dir = %staging.display(), "discarding leftover staging area");
        }
        remove_dir_if_exists(&staging).await?;
        tokio::fs::create_dir_all(&staging).await?;
        debug!(index = name, dimensions, dir = %staging.display(), "created staging area");
        Ok(())
    }

    async fn append(&self, name: &str, records: &[IndexedRecord]) -> Result<()> {
        let staging = self.staging_dir(name);
        if !tokio::fs::try_exists(&staging).await? {
            return Err(RagError::VectorStoreError {
                backend: "Disk".to_string(),
                message: format!("no staging area for index '{name}'"),
            });
        }

        let sequence = segment_files(&staging).await?.len() + 1;
        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let segment = staging.join(format!("{SEGMENT_PREFIX}{sequence:05}{SEGMENT_SUFFIX}"));
        tokio::fs::write(&segment, buffer).await?;
        debug!(
            index = name,
            segment = %segment.display(),
            records = records.len(),
            "appended segment"
        );
        Ok(())
    }

    async fn commit_collection(&self, name: &str, manifest: &IndexManifest) -> Result<()> {
        let staging = self.staging_dir(name);
        let target = self.index_dir(name);
        if !tokio::fs::try_exists(&staging).await? {
            return Err(RagError::VectorStoreError {
                backend: "Disk".to_string(),
                message: format!("index '{name}' has no staging area to commit"),
            });
        }

        let manifest_json = serde_json::to_vec_pretty(manifest)?;
        tokio::fs::write(staging.join(MANIFEST_FILE), manifest_json).await?;

        // The old index stays in place until the new one is complete.
        let replaced = tokio::fs::try_exists(&target).await?;
        let retired = self.retired_dir(name);
        if replaced {
            remove_dir_if_exists(&retired).await?;
            tokio::fs::rename(&target, &retired).await?;
        }
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            if replaced {
                tokio::fs::rename(&retired, &target).await?;
            }
            return Err(e.into());
        }
        self.cache.write().await.remove(name);
        if replaced {
            remove_dir_if_exists(&retired).await?;
        }

        info!(
            index = name,
            records = manifest.record_count,
            replaced,
            dir = %target.display(),
            "committed index"
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.cache.write().await.remove(name);
        remove_dir_if_exists(&self.index_dir(name)).await?;
        remove_dir_if_exists(&self.staging_dir(name)).await?;
        remove_dir_if_exists(&self.retired_dir(name)).await?;
        Ok(())
    }

    async fn manifest(&self, name: &str) -> Result<Option<IndexManifest>> {
        read_manifest(&self.index_dir(name)).await
    }

    async fn search(
        &self,
        name: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedMatch>> {
        let index = self.load(name).await?;
        if index.manifest.dimensions != 0 && index.manifest.dimensions != embedding.len() {
            return Err(RagError::VectorStoreError {
                backend: "Disk".to_string(),
                message: format!(
                    "query has {} dimensions, index '{name}' has {}",
                    embedding.len(),
                    index.manifest.dimensions
                ),
            });
        }
        Ok(rank(index.records.iter(), embedding, top_k))
    }
}
