//! Data types for documents, chunks, indexed records, and search matches.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key holding the name of the file a document was loaded from.
pub const SOURCE_KEY: &str = "source";

/// Metadata key holding the heading path of a markdown section.
pub const SECTION_KEY: &str = "section";

/// A parsed document with its source attribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata, always carrying [`SOURCE_KEY`] once loaded.
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with empty metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), metadata: HashMap::new() }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The file name this document was loaded from, if known.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A bounded segment of a [`Document`], not yet embedded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Metadata inherited unchanged from the parent document.
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// The file name this chunk was derived from, if known.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }

    /// Pair this chunk with its embedding vector.
    pub fn into_record(self, embedding: Vec<f32>) -> IndexedRecord {
        IndexedRecord { text: self.text, metadata: self.metadata, embedding }
    }
}

/// A chunk together with its embedding, as persisted in a vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedRecord {
    /// The chunk text.
    pub text: String,
    /// Metadata carried over from the chunk.
    pub metadata: HashMap<String, String>,
    /// The vector embedding for `text`.
    pub embedding: Vec<f32>,
}

impl IndexedRecord {
    /// The file name this record was derived from, if known.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A retrieved [`IndexedRecord`] paired with a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMatch {
    /// The retrieved record.
    pub record: IndexedRecord,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

impl RetrievedMatch {
    /// The retrieved chunk text.
    pub fn text(&self) -> &str {
        &self.record.text
    }

    /// The file name of the retrieved chunk, if known.
    pub fn source(&self) -> Option<&str> {
        self.record.source()
    }
}
