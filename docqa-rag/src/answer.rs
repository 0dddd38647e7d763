//! Question answering over a committed index.
//!
//! [`QueryEngine`] runs retrieve → compose → generate. When nothing clears the
//! similarity threshold the model is asked to answer from general knowledge
//! instead, and the returned [`Answer`] says so.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::RagConfig;
use crate::document::RetrievedMatch;
use crate::embedding::RateLimitedEmbedder;
use crate::error::Result;
use crate::generation::{GenerationOptions, GenerativeModel};
use crate::indexer::IndexHandle;
use crate::prompt::{PromptComposer, PromptKind};
use crate::retriever::{Retrieval, Retriever};

/// The final output of a query.
#[derive(Debug, Clone)]
pub struct Answer {
    /// The model's response.
    pub text: String,
    /// Whether the answer was grounded in retrieved passages.
    pub kind: PromptKind,
    /// Passages that cleared the threshold, best first. Empty for fallback answers.
    pub matches: Vec<RetrievedMatch>,
}

impl Answer {
    /// Whether the answer was built from retrieved passages.
    pub fn is_grounded(&self) -> bool {
        self.kind == PromptKind::Grounded
    }
}

/// Answers questions against an index.
pub struct QueryEngine {
    retriever: Retriever,
    composer: PromptComposer,
    model: Arc<dyn GenerativeModel>,
    options: GenerationOptions,
}

impl QueryEngine {
    /// Create an engine from its parts.
    pub fn new(
        retriever: Retriever,
        model: Arc<dyn GenerativeModel>,
        options: GenerationOptions,
    ) -> Self {
        Self { retriever, composer: PromptComposer::new(), model, options }
    }

    /// Create an engine using the retrieval and generation settings in `config`.
    ///
    /// `embedder` must be the client the index was built with.
    pub fn from_config(
        config: &RagConfig,
        embedder: RateLimitedEmbedder,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        let retriever = Retriever::new(embedder, config.retrieval_k, config.similarity_threshold);
        Self::new(retriever, model, GenerationOptions::from_config(config))
    }

    /// The retriever in use.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer `question` from `index`.
    ///
    /// # Errors
    ///
    /// Propagates embedding and store errors from retrieval and
    /// [`RagError::GenerationError`](crate::RagError::GenerationError) from the model.
    pub async fn ask(&self, index: &IndexHandle, question: &str) -> Result<Answer> {
        let retrieval = self.retriever.retrieve(index, question).await?;
        let prompt = self.composer.compose(question, &retrieval);
        info!(
            index = %index.name(),
            kind = ?prompt.kind,
            passages = retrieval.matches().len(),
            model = %self.model.model_name(),
            "generating answer"
        );

        let text = self.model.complete(&prompt.text, &self.options).await.map_err(|e| {
            error!(error = %e, "generation failed");
            e
        })?;

        let matches = match retrieval {
            Retrieval::Grounded(matches) => matches,
            Retrieval::NoRelevantContext => Vec::new(),
        };
        Ok(Answer { text, kind: prompt.kind, matches })
    }
}
