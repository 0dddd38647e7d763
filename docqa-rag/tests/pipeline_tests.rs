//! End-to-end tests for indexing and answering over a temporary corpus.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docqa_rag::{
    DiskVectorStore, FreshnessPolicy, GenerationOptions, GenerativeModel, IndexHandle,
    IndexOutcome, Indexer, PromptKind, QueryEngine, RagConfig, RagError, Result, VectorStore,
};
use tempfile::TempDir;

const DIM: usize = 64;

/// Bag-of-words embedder: each lowercase word is hashed (FNV-1a) into one of
/// `DIM` buckets and the vector is L2-normalized.
#[derive(Default)]
struct HashingEmbedder {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl HashingEmbedder {
    fn failing_on(call: usize) -> Self {
        Self { calls: AtomicUsize::new(0), fail_on_call: Some(call) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn bucket(word: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % DIM as u64) as usize
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIM];
    let lower = text.to_lowercase();
    for word in lower.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty()) {
        vector[bucket(word)] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

#[async_trait]
impl docqa_rag::EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(bag_of_words(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(RagError::EmbeddingError {
                provider: "hashing".to_string(),
                message: "service unavailable".to_string(),
            });
        }
        Ok(texts.iter().map(|text| bag_of_words(text)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

struct EchoModel;

#[async_trait]
impl GenerativeModel for EchoModel {
    async fn complete(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Ok(format!("echo: {}", prompt.len()))
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

struct Corpus {
    dir: TempDir,
}

impl Corpus {
    fn networking() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(
            docs.join("routing.md"),
            "# Routing\n\nRouters forward packets between networks using a routing table.\n\n\
             Each route names a next hop.\n",
        )
        .unwrap();
        std::fs::write(
            docs.join("auth.md"),
            "# Authentication\n\nKerberos issues tickets that prove identity to services.\n\n\
             A ticket expires after a few hours.\n",
        )
        .unwrap();
        std::fs::write(
            docs.join("switching.md"),
            "# Switching\n\nSwitches learn hardware addresses and forward frames \
             inside one segment.\n",
        )
        .unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn docs(&self) -> std::path::PathBuf {
        self.root().join("docs")
    }

    fn config(&self) -> RagConfig {
        RagConfig::builder()
            .doc_dir(self.docs().to_string_lossy())
            .index_path_prefix("index")
            .similarity_threshold(0.1)
            .build()
            .unwrap()
    }

    fn store(&self) -> Arc<DiskVectorStore> {
        Arc::new(DiskVectorStore::new(self.root().join("indexes")))
    }
}

fn indexer(
    config: RagConfig,
    embedder: Arc<HashingEmbedder>,
    store: Arc<DiskVectorStore>,
) -> Indexer {
    Indexer::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_store(store)
        .build()
        .unwrap()
}

async fn build(corpus: &Corpus, embedder: Arc<HashingEmbedder>) -> IndexHandle {
    indexer(corpus.config(), embedder, corpus.store()).run().await.unwrap().into_handle().unwrap()
}

#[tokio::test]
async fn three_files_index_in_one_batch_and_answer_from_the_right_file() {
    let corpus = Corpus::networking();
    let embedder = Arc::new(HashingEmbedder::default());
    let indexer = indexer(corpus.config(), Arc::clone(&embedder), corpus.store());

    let handle = indexer.run().await.unwrap().into_handle().unwrap();
    let report = handle.report().unwrap();
    assert!(!handle.reused());
    assert_eq!(report.files, 3);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.batches, 1);
    assert_eq!(handle.record_count(), 3);
    assert_eq!(embedder.calls(), 1);

    let engine =
        QueryEngine::from_config(indexer.config(), indexer.embedder().clone(), Arc::new(EchoModel));
    let answer = engine.ask(&handle, "kerberos").await.unwrap();

    assert_eq!(answer.kind, PromptKind::Grounded);
    assert_eq!(answer.matches[0].source(), Some("auth.md"));
    assert!(answer.matches.iter().all(|m| m.source() == Some("auth.md")));
    assert!(answer.text.starts_with("echo: "));
}

#[tokio::test]
async fn unrelated_question_gets_fallback_answer() {
    let corpus = Corpus::networking();
    let embedder = Arc::new(HashingEmbedder::default());
    let indexer = indexer(corpus.config(), Arc::clone(&embedder), corpus.store());
    let handle = indexer.run().await.unwrap().into_handle().unwrap();

    let engine =
        QueryEngine::from_config(indexer.config(), indexer.embedder().clone(), Arc::new(EchoModel));
    let answer = engine.ask(&handle, "how do cats purr").await.unwrap();

    assert_eq!(answer.kind, PromptKind::Fallback);
    assert!(answer.matches.is_empty());
}

#[tokio::test]
async fn second_run_reuses_the_index_without_embedding() {
    let corpus = Corpus::networking();
    let embedder = Arc::new(HashingEmbedder::default());

    let first = build(&corpus, Arc::clone(&embedder)).await;
    assert!(!first.reused());
    let calls_after_first = embedder.calls();

    // A fresh store instance, as after a process restart.
    let second = build(&corpus, Arc::clone(&embedder)).await;
    assert!(second.reused());
    assert_eq!(embedder.calls(), calls_after_first);
    assert_eq!(second.record_count(), first.record_count());
}

#[tokio::test]
async fn failed_batch_leaves_no_committed_index() {
    let corpus = Corpus::networking();
    let config = RagConfig::builder()
        .doc_dir(corpus.docs().to_string_lossy())
        .index_path_prefix("index")
        .batch_size(1)
        .build()
        .unwrap();
    let store = corpus.store();
    let name = config.index_name();
    let embedder = Arc::new(HashingEmbedder::failing_on(2));

    let err = indexer(config.clone(), embedder, Arc::clone(&store)).run().await.unwrap_err();
    match err {
        RagError::PipelineError(message) => assert!(message.contains("batch 2/3"), "{message}"),
        other => panic!("expected pipeline error, got {other:?}"),
    }

    assert!(!store.collection_exists(&name).await.unwrap());
    let staged = store.staging_dir(&name);
    assert!(staged.join("segment-00001.jsonl").exists());
    assert!(!staged.join("segment-00002.jsonl").exists());

    // A clean rerun discards the leftover staging area and commits.
    let embedder = Arc::new(HashingEmbedder::default());
    let handle = indexer(config, Arc::clone(&embedder), Arc::clone(&store))
        .run()
        .await
        .unwrap()
        .into_handle();
    assert_eq!(handle.unwrap().record_count(), 3);
    assert_eq!(embedder.calls(), 3);
    assert!(!staged.exists());
}

#[tokio::test]
async fn content_hash_policy_rebuilds_only_when_the_corpus_changes() {
    let corpus = Corpus::networking();
    let config = RagConfig::builder()
        .doc_dir(corpus.docs().to_string_lossy())
        .index_path_prefix("index")
        .freshness(FreshnessPolicy::ContentHash)
        .build()
        .unwrap();
    let embedder = Arc::new(HashingEmbedder::default());

    let first = indexer(config.clone(), Arc::clone(&embedder), corpus.store()).run().await.unwrap();
    assert!(first.into_handle().unwrap().manifest().unwrap().fingerprint.is_some());
    assert_eq!(embedder.calls(), 1);

    let unchanged =
        indexer(config.clone(), Arc::clone(&embedder), corpus.store()).run().await.unwrap();
    assert!(unchanged.into_handle().unwrap().reused());
    assert_eq!(embedder.calls(), 1);

    let vlan = corpus.docs().join("vlan.md");
    std::fs::write(vlan, "VLANs split one switch into segments.\n").unwrap();
    let rebuilt = indexer(config, Arc::clone(&embedder), corpus.store()).run().await.unwrap();
    let handle = rebuilt.into_handle().unwrap();
    assert!(!handle.reused());
    assert_eq!(handle.record_count(), 4);
    assert_eq!(embedder.calls(), 2);
}

fn content_hash_config(corpus: &Corpus) -> RagConfig {
    RagConfig::builder()
        .doc_dir(corpus.docs().to_string_lossy())
        .index_path_prefix("index")
        .freshness(FreshnessPolicy::ContentHash)
        .build()
        .unwrap()
}

#[tokio::test]
async fn failed_rebuild_keeps_the_previous_index() {
    let corpus = Corpus::networking();
    let config = content_hash_config(&corpus);
    let store = corpus.store();
    let name = config.index_name();
    indexer(config.clone(), Arc::new(HashingEmbedder::default()), Arc::clone(&store))
        .run()
        .await
        .unwrap();

    let vlan = corpus.docs().join("vlan.md");
    std::fs::write(vlan, "VLANs split one switch into segments.\n").unwrap();
    let failing = Arc::new(HashingEmbedder::failing_on(1));
    let err = indexer(config.clone(), Arc::clone(&failing), Arc::clone(&store))
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::PipelineError(_)), "{err}");
    assert_eq!(failing.calls(), 1);

    // The last good index is still committed and answers queries.
    assert!(store.collection_exists(&name).await.unwrap());
    let handle = IndexHandle::open(store.clone(), name.clone()).await.unwrap();
    assert_eq!(handle.record_count(), 3);
    let matches = handle.search(&bag_of_words("kerberos"), 10).await.unwrap();
    assert_eq!(matches.len(), 3);
    assert_eq!(matches[0].source(), Some("auth.md"));
    assert!(matches.iter().all(|m| m.source() != Some("vlan.md")));

    // The next clean run still sees the corpus as changed and replaces it.
    let rebuilt = indexer(config, Arc::new(HashingEmbedder::default()), Arc::clone(&store))
        .run()
        .await
        .unwrap()
        .into_handle()
        .unwrap();
    assert!(!rebuilt.reused());
    assert_eq!(rebuilt.record_count(), 4);
    assert!(!store.staging_dir(&name).exists());
}

#[tokio::test]
async fn content_hash_policy_removes_the_index_of_an_emptied_corpus() {
    let corpus = Corpus::networking();
    let config = content_hash_config(&corpus);
    let store = corpus.store();
    let name = config.index_name();
    indexer(config.clone(), Arc::new(HashingEmbedder::default()), Arc::clone(&store))
        .run()
        .await
        .unwrap();
    assert!(store.collection_exists(&name).await.unwrap());

    for file in ["routing.md", "auth.md", "switching.md"] {
        std::fs::remove_file(corpus.docs().join(file)).unwrap();
    }
    let embedder = Arc::new(HashingEmbedder::default());
    let outcome = indexer(config, Arc::clone(&embedder), Arc::clone(&store)).run().await.unwrap();
    assert!(matches!(outcome, IndexOutcome::Empty));
    assert_eq!(embedder.calls(), 0);
    assert!(!store.collection_exists(&name).await.unwrap());
}

#[tokio::test]
async fn empty_corpus_produces_no_index() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("notes.pdf"), b"%PDF").unwrap();
    std::fs::write(docs.join("blank.md"), "   \n").unwrap();

    let config = RagConfig::builder()
        .doc_dir(docs.to_string_lossy())
        .index_path_prefix("index")
        .build()
        .unwrap();
    let store = Arc::new(DiskVectorStore::new(dir.path()));
    let embedder = Arc::new(HashingEmbedder::default());
    let name = config.index_name();

    let outcome = indexer(config, Arc::clone(&embedder), Arc::clone(&store)).run().await.unwrap();
    assert!(matches!(outcome, IndexOutcome::Empty));
    assert_eq!(embedder.calls(), 0);
    assert!(!store.collection_exists(&name).await.unwrap());
}

#[tokio::test]
async fn missing_corpus_directory_produces_no_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig::builder()
        .doc_dir(dir.path().join("nope").to_string_lossy())
        .index_path_prefix("index")
        .build()
        .unwrap();
    let store = Arc::new(DiskVectorStore::new(dir.path()));
    let embedder = Arc::new(HashingEmbedder::default());
    let name = config.index_name();

    let outcome = indexer(config, Arc::clone(&embedder), Arc::clone(&store)).run().await.unwrap();
    assert!(matches!(outcome, IndexOutcome::Empty));
    assert_eq!(embedder.calls(), 0);
    assert!(!store.collection_exists(&name).await.unwrap());
}
