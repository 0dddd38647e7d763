//! Prompt assembly for grounded and fallback answers.

use crate::retriever::Retrieval;

fn grounded_prompt(context: &str, question: &str) -> String {
    format!(
        "answer the question based only on the following context:\n\
         {context}\n\
         answer the question based on the above context: {question}.\n\
         provide a detailed answer.\n\
         don't justify your answers.\n\
         don't give information not mentioned in the context information.\n\
         do not say \"according to the context\" or \"mentioned in the context\" or similar."
    )
}

fn fallback_prompt(question: &str) -> String {
    format!(
        "the local indexed data did not contain any information directly related to the question.\n\
         answer the question based on your general knowledge:\n\
         {question}."
    )
}

/// Separator placed between retrieved passages in a grounded prompt.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Which template produced a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Answer strictly from retrieved context.
    Grounded,
    /// Answer from general knowledge; nothing relevant was retrieved.
    Fallback,
}

/// A prompt ready for the generative model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    /// The template used.
    pub kind: PromptKind,
    /// The full prompt text.
    pub text: String,
}

/// Fills the grounded or fallback template from a [`Retrieval`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptComposer;

impl PromptComposer {
    /// Create a composer.
    pub fn new() -> Self {
        Self
    }

    /// Compose the prompt for `question`.
    pub fn compose(&self, question: &str, retrieval: &Retrieval) -> ComposedPrompt {
        match retrieval {
            Retrieval::Grounded(matches) => {
                let context = matches
                    .iter()
                    .map(|m| m.text())
                    .collect::<Vec<_>>()
                    .join(CONTEXT_SEPARATOR);
                ComposedPrompt {
                    kind: PromptKind::Grounded,
                    text: grounded_prompt(&context, question),
                }
            }
            Retrieval::NoRelevantContext => ComposedPrompt {
                kind: PromptKind::Fallback,
                text: fallback_prompt(question),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::{IndexedRecord, RetrievedMatch};

    fn passage(text: &str, score: f32) -> RetrievedMatch {
        RetrievedMatch {
            record: IndexedRecord {
                text: text.to_string(),
                metadata: HashMap::new(),
                embedding: vec![1.0],
            },
            score,
        }
    }

    #[test]
    fn grounded_prompt_joins_context_in_order() {
        let retrieval = Retrieval::Grounded(vec![
            passage("first passage", 0.9),
            passage("second passage", 0.5),
        ]);
        let prompt = PromptComposer::new().compose("what is a subnet", &retrieval);

        assert_eq!(prompt.kind, PromptKind::Grounded);
        assert!(prompt.text.contains("first passage\n\nsecond passage"));
        assert!(prompt.text.contains("based on the above context: what is a subnet."));
        assert!(prompt.text.contains("don't justify your answers."));
        let opening = "answer the question based only on the following context:\nfirst passage";
        assert!(prompt.text.starts_with(opening));
    }

    #[test]
    fn fallback_prompt_has_no_context_section() {
        let prompt =
            PromptComposer::new().compose("what is a subnet", &Retrieval::NoRelevantContext);

        assert_eq!(prompt.kind, PromptKind::Fallback);
        assert!(prompt.text.contains("general knowledge"));
        assert!(prompt.text.ends_with("what is a subnet."));
        assert!(!prompt.text.contains("following context"));
    }

    #[test]
    fn placeholder_text_inside_context_is_left_alone() {
        let retrieval = Retrieval::Grounded(vec![passage("literal {question} token", 0.9)]);
        let prompt = PromptComposer::new().compose("q", &retrieval);
        assert!(prompt.text.contains("literal {question} token"));
        assert!(prompt.text.contains("based on the above context: q."));
    }
}
