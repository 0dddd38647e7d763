//! Corpus discovery and concurrent document loading.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::{Document, SOURCE_KEY};
use crate::error::{RagError, Result};
use crate::parser::ParserRegistry;

/// Discovers corpus files and parses them on a bounded pool of tasks.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{DocumentLoader, MarkdownMode, ParserRegistry};
///
/// let loader = DocumentLoader::new(ParserRegistry::with_defaults(MarkdownMode::Single), 8);
/// let files = loader.discover("./docs")?;
/// let documents = loader.load(&files).await;
/// ```
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    parsers: ParserRegistry,
    max_concurrency: usize,
}

impl DocumentLoader {
    /// Create a loader that runs at most `max_concurrency` file loads at once.
    pub fn new(parsers: ParserRegistry, max_concurrency: usize) -> Self {
        Self { parsers, max_concurrency: max_concurrency.max(1) }
    }

    /// The parsers used to recognize and read files.
    pub fn parsers(&self) -> &ParserRegistry {
        &self.parsers
    }

    /// Recursively list every regular file under `root` that a registered
    /// parser handles, sorted by path.
    ///
    /// A missing `root` holds no files and yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] if `root` exists but is not a directory.
    pub fn discover(&self, root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let root = root.as_ref();
        if !root.exists() {
            warn!(root = %root.display(), "corpus directory does not exist");
            return Ok(Vec::new());
        }
        if !root.is_dir() {
            return Err(RagError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("corpus path {} is not a directory", root.display()),
            )));
        }

        let mut files = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.parsers.supports(entry.path()))
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();

        files.sort();
        debug!(root = %root.display(), count = files.len(), "discovered files");
        Ok(files)
    }

    /// Load every file concurrently. Files that fail to load are logged and
    /// contribute no documents.
    ///
    /// Documents from one file stay in parse order; files complete in any order.
    pub async fn load(&self, files: &[PathBuf]) -> Vec<Document> {
        let per_file: Vec<Vec<Document>> = futures::stream::iter(files.iter().cloned())
            .map(|path| async move {
                match self.load_file(&path).await {
                    Ok(documents) => {
                        debug!(file = %path.display(), documents = documents.len(), "loaded file");
                        documents
                    }
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "failed to load file, skipping");
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let documents: Vec<Document> = per_file.into_iter().flatten().collect();
        info!(files = files.len(), documents = documents.len(), "loaded documents");
        documents
    }

    /// Read and parse a single file, tagging each document with its file name.
    pub async fn load_file(&self, path: &Path) -> Result<Vec<Document>> {
        let parser = self.parsers.for_path(path).cloned().ok_or_else(|| RagError::ParseError {
            path: path.to_path_buf(),
            message: "no parser registered for this extension".to_string(),
        })?;

        let bytes = tokio::fs::read(path).await.map_err(|e| RagError::ParseError {
            path: path.to_path_buf(),
            message: format!("read failed: {e}"),
        })?;

        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let documents = parser.parse(path, &bytes)?;
        Ok(documents
            .into_iter()
            .map(|mut document| {
                document.metadata.insert(SOURCE_KEY.to_string(), source.clone());
                document
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs;

    use super::*;
    use crate::parser::MarkdownMode;

    fn loader(concurrency: usize) -> DocumentLoader {
        DocumentLoader::new(ParserRegistry::with_defaults(MarkdownMode::Single), concurrency)
    }

    #[test]
    fn discovers_supported_files_recursively() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::write(root.join("a.md"), "# A").unwrap();
        fs::write(root.join("nested/b.md"), "# B").unwrap();
        fs::write(root.join("nested/deeper/c.txt"), "C").unwrap();
        fs::write(root.join("nested/image.png"), [0u8, 1, 2]).unwrap();

        let files = loader(4).discover(root).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn missing_root_has_no_files() {
        let temp = tempfile::tempdir().unwrap();
        let files = loader(4).discover(temp.path().join("nope")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn file_root_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("single.md");
        fs::write(&path, "# Single").unwrap();
        let err = loader(4).discover(&path).unwrap_err();
        assert!(matches!(err, RagError::Io(_)));
    }

    #[tokio::test]
    async fn tags_documents_with_file_name_only() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("sub")).unwrap();
        let path = temp.path().join("sub/peering.md");
        fs::write(&path, "# Peering\n\nCross-tenant peering is supported.").unwrap();

        let docs = loader(2).load(&[path]).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source(), Some("peering.md"));
    }

    #[tokio::test]
    async fn bad_files_are_skipped_and_nothing_is_lost() {
        let temp = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for i in 0..40 {
            let path = temp.path().join(format!("doc{i:02}.md"));
            fs::write(&path, format!("Document number {i}.")).unwrap();
            files.push(path);
        }
        let bad = temp.path().join("bad.md");
        fs::write(&bad, [0xffu8, 0xfe, 0xfd]).unwrap();
        files.push(bad);
        files.push(temp.path().join("vanished.md"));

        let docs = loader(3).load(&files).await;
        assert_eq!(docs.len(), 40);
        let sources: HashSet<_> = docs.iter().filter_map(Document::source).collect();
        assert_eq!(sources.len(), 40);
        assert!(!sources.contains("bad.md"));
    }
}
