//! Similarity retrieval with a minimum-score threshold.

use tracing::{debug, info};

use crate::document::RetrievedMatch;
use crate::embedding::RateLimitedEmbedder;
use crate::error::Result;
use crate::indexer::IndexHandle;

/// Outcome of a retrieval.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// At least one match cleared the threshold; ordered best first.
    Grounded(Vec<RetrievedMatch>),
    /// Nothing cleared the threshold; answer from general knowledge.
    NoRelevantContext,
}

impl Retrieval {
    /// Build a retrieval from already-filtered matches.
    pub fn from_matches(matches: Vec<RetrievedMatch>) -> Self {
        if matches.is_empty() { Retrieval::NoRelevantContext } else { Retrieval::Grounded(matches) }
    }

    /// The matches, empty for [`Retrieval::NoRelevantContext`].
    pub fn matches(&self) -> &[RetrievedMatch] {
        match self {
            Retrieval::Grounded(matches) => matches,
            Retrieval::NoRelevantContext => &[],
        }
    }

    /// Whether any match cleared the threshold.
    pub fn is_grounded(&self) -> bool {
        matches!(self, Retrieval::Grounded(_))
    }
}

/// Keep matches scoring at least `threshold`, preserving order.
pub fn filter_by_threshold(matches: Vec<RetrievedMatch>, threshold: f32) -> Vec<RetrievedMatch> {
    matches.into_iter().filter(|m| m.score >= threshold).collect()
}

/// Embeds a question and fetches the closest records from an index.
#[derive(Clone)]
pub struct Retriever {
    embedder: RateLimitedEmbedder,
    top_k: usize,
    similarity_threshold: f32,
}

impl Retriever {
    /// Create a retriever. `embedder` must embed into the same space the index was built with.
    pub fn new(embedder: RateLimitedEmbedder, top_k: usize, similarity_threshold: f32) -> Self {
        Self { embedder, top_k, similarity_threshold }
    }

    /// The configured number of nearest records requested.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The configured minimum score.
    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    /// Retrieve the matches for `question` that clear the threshold.
    ///
    /// An empty result is [`Retrieval::NoRelevantContext`], not an error.
    pub async fn retrieve(&self, index: &IndexHandle, question: &str) -> Result<Retrieval> {
        let embedding = self.embedder.embed_one(question).await?;
        let matches = index.search(&embedding, self.top_k).await?;
        let candidates = matches.len();
        for m in &matches {
            debug!(source = m.source().unwrap_or("unknown"), score = m.score, "candidate match");
        }

        let kept = filter_by_threshold(matches, self.similarity_threshold);
        info!(
            candidates,
            kept = kept.len(),
            threshold = self.similarity_threshold,
            "retrieved matches"
        );
        Ok(Retrieval::from_matches(kept))
    }
}
