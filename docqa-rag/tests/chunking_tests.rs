//! Property tests for recursive chunking bounds.

use docqa_rag::{Chunker, Document, RecursiveChunker};
use proptest::prelude::*;

/// Space-separated unique tokens `w0000 w0001 ...`, so a suffix of one chunk
/// can only match a prefix of the next at a token boundary.
fn token_text(count: usize) -> String {
    (0..count).map(|i| format!("w{i:04}")).collect::<Vec<_>>().join(" ")
}

/// Length of the longest suffix of `prev` that is also a prefix of `next`.
fn shared_chars(prev: &str, next: &str) -> usize {
    let prev: Vec<char> = prev.chars().collect();
    let next: Vec<char> = next.chars().collect();
    (1..=prev.len().min(next.len()))
        .rev()
        .find(|&k| prev[prev.len() - k..] == next[..k])
        .unwrap_or(0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn chunks_respect_size_on_arbitrary_text(
        text in "[a-zA-Z0-9 .!?\n\u{e9}\u{4e2d}]{0,400}",
        chunk_size in 1usize..120,
        overlap_ratio in 0.0f64..1.0,
    ) {
        let chunk_overlap = (chunk_size as f64 * overlap_ratio) as usize;
        let chunker = RecursiveChunker::new(chunk_size, chunk_overlap);
        let chunks = chunker.chunk(&Document::new(text.clone()).with_metadata("source", "a.md"));

        for chunk in &chunks {
            let len = chunk.text.chars().count();
            prop_assert!(len >= 1 && len <= chunk_size, "chunk of {} chars: {:?}", len, chunk.text);
            prop_assert_eq!(chunk.text.trim(), chunk.text.as_str());
            prop_assert_eq!(chunk.source(), Some("a.md"));
        }
        if text.trim().is_empty() {
            prop_assert!(chunks.is_empty());
        }
    }

    #[test]
    fn consecutive_chunks_overlap_within_bound(
        tokens in 1usize..200,
        chunk_size in 6usize..80,
        overlap_ratio in 0.0f64..1.0,
    ) {
        let chunk_overlap = (chunk_size as f64 * overlap_ratio) as usize;
        let text = token_text(tokens);
        let chunker = RecursiveChunker::new(chunk_size, chunk_overlap);
        let chunks = chunker.split_text(&text);

        for pair in chunks.windows(2) {
            let shared = shared_chars(&pair[0], &pair[1]);
            prop_assert!(
                shared <= chunk_overlap,
                "{} shared chars exceed overlap {}: {:?} / {:?}",
                shared, chunk_overlap, pair[0], pair[1],
            );
        }

        // No token is lost.
        for i in 0..tokens {
            let token = format!("w{i:04}");
            prop_assert!(chunks.iter().any(|c| c.split(' ').any(|t| t == token)));
        }
    }
}

#[test]
fn default_sizes_keep_a_short_file_whole() {
    let text = "# Title\n\nA short paragraph about routing.";
    let chunks = RecursiveChunker::new(500, 50).split_text(text);
    assert_eq!(chunks, vec![text.to_string()]);
}
