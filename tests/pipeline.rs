//! End-to-end pipeline tests with deterministic fakes for the embedder,
//! the generator, and the remote messages API. Only the snapshot file on
//! disk is real.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use member_qa::embedding::Embedder;
use member_qa::engine::{EngineError, QaEngine};
use member_qa::generate::{GenerationError, Generator};
use member_qa::models::Member;
use member_qa::retrieve::Retriever;
use member_qa::roster::Roster;
use member_qa::store::{CorpusStore, RemoteClient, StoreError};

/// Hashes words into a small bag-of-words vector so that texts sharing
/// words with the question rank higher. Deterministic across runs.
struct BagOfWordsEmbedder;

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words-fake"
    }

    fn dims(&self) -> usize {
        32
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 32];
                for word in text.to_lowercase().split_whitespace() {
                    let mut hasher = DefaultHasher::new();
                    word.hash(&mut hasher);
                    v[(hasher.finish() % 32) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Echoes a canned answer and counts invocations, so tests can assert the
/// generator was (or was not) reached.
struct FakeGenerator {
    calls: AtomicUsize,
    answer: String,
}

impl FakeGenerator {
    fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            answer: answer.to_string(),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    fn model_name(&self) -> &str {
        "fake-llm"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

/// Remote that always fails; snapshot-backed tests must never need it.
struct DownRemote {
    calls: AtomicUsize,
}

impl DownRemote {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteClient for DownRemote {
    async fn fetch_all_messages(&self) -> anyhow::Result<Vec<member_qa::models::Message>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("remote down")
    }
}

fn member(name: &str) -> Member {
    Member {
        name: name.to_string(),
        aliases: vec![],
    }
}

fn roster() -> Roster {
    Roster::new(vec![
        member("Layla Kawaguchi"),
        member("Vikram Desai"),
        member("Hans Müller"),
    ])
}

fn snapshot_line(id: &str, user: &str, ts: &str, text: &str) -> String {
    serde_json::json!({
        "id": id,
        "user_id": "u1",
        "user_name": user,
        "timestamp": ts,
        "message": text,
    })
    .to_string()
}

fn write_snapshot(dir: &tempfile::TempDir) -> PathBuf {
    let lines = [
        snapshot_line(
            "1",
            "Layla Kawaguchi",
            "2025-06-01T10:00:00Z",
            "planning my trip to London for the first week of December",
        ),
        snapshot_line(
            "2",
            "Layla Kawaguchi",
            "2025-06-02T11:00:00Z",
            "need a dinner reservation for Friday",
        ),
        snapshot_line(
            "3",
            "Vikram Desai",
            "2025-06-03T09:00:00Z",
            "my squash game moved to Sunday",
        ),
    ];
    let path = dir.path().join("messages_checkpoint.ndjson");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

struct Harness {
    engine: QaEngine,
    generator: Arc<FakeGenerator>,
    remote: Arc<DownRemote>,
    _tmp: tempfile::TempDir,
}

fn harness() -> Harness {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = write_snapshot(&tmp);

    let remote = DownRemote::new();
    let store = CorpusStore::new(path, remote.clone(), Duration::from_secs(3600));
    let retriever = Retriever::new(Arc::new(BagOfWordsEmbedder), 64, 10);
    let generator = FakeGenerator::new("Layla's trip to London is in early December.");
    let engine = QaEngine::new(roster(), store, retriever, generator.clone(), 0.2);

    Harness {
        engine,
        generator,
        remote,
        _tmp: tmp,
    }
}

#[tokio::test]
async fn test_answers_question_about_known_member() {
    let h = harness();

    let result = h
        .engine
        .answer("When is Layla planning her trip to London?", true)
        .await
        .unwrap();

    assert_eq!(result.answer, "Layla's trip to London is in early December.");
    assert_eq!(result.metadata.person.as_deref(), Some("Layla Kawaguchi"));
    assert_eq!(result.metadata.messages_found, 2);
    assert_eq!(result.metadata.retrieval_method, "semantic");
    assert!(result.confidence > 0.0);
    assert_eq!(h.generator.call_count(), 1);
    // Snapshot satisfied the load; the remote was never contacted.
    assert_eq!(h.remote.call_count(), 0);
}

#[tokio::test]
async fn test_unresolvable_question_short_circuits() {
    let h = harness();

    let result = h
        .engine
        .answer("What is the capital of the moon?", true)
        .await
        .unwrap();

    assert_eq!(result.metadata.person, None);
    assert!(result.confidence < 0.1);
    assert_eq!(result.metadata.messages_found, 0);
    assert!(!result.answer.is_empty());
    // Nothing past resolution runs: no generation, no data load.
    assert_eq!(h.generator.call_count(), 0);
    assert_eq!(h.remote.call_count(), 0);
}

#[tokio::test]
async fn test_repeat_question_uses_cache() {
    let h = harness();
    let question = "When is Layla planning her trip to London?";

    let first = h.engine.answer(question, true).await.unwrap();
    let second = h.engine.answer(question, true).await.unwrap();

    // First call loads the snapshot; the second is served from cache.
    assert!(!first.metadata.used_cached_data);
    assert!(second.metadata.used_cached_data);
    assert_eq!(first.answer, second.answer);
    assert_eq!(first.metadata.messages_found, second.metadata.messages_found);
    assert_eq!(h.generator.call_count(), 2);
}

#[tokio::test]
async fn test_member_without_messages_gets_low_confidence_result() {
    let h = harness();

    let result = h
        .engine
        .answer("What has Hans been up to?", true)
        .await
        .unwrap();

    assert_eq!(result.metadata.person.as_deref(), Some("Hans Müller"));
    assert_eq!(result.metadata.messages_found, 0);
    assert_eq!(result.confidence, 0.0);
    // No evidence, no synthesis.
    assert_eq!(h.generator.call_count(), 0);
}

#[tokio::test]
async fn test_retrieval_never_leaks_other_members_messages() {
    let h = harness();

    let result = h
        .engine
        .answer("When is Vikram's squash game?", true)
        .await
        .unwrap();

    assert_eq!(result.metadata.person.as_deref(), Some("Vikram Desai"));
    assert_eq!(result.metadata.messages_found, 1);
}

#[tokio::test]
async fn test_no_data_anywhere_is_a_typed_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("missing.ndjson");

    let store = CorpusStore::new(path, DownRemote::new(), Duration::from_secs(3600));
    let retriever = Retriever::new(Arc::new(BagOfWordsEmbedder), 64, 10);
    let generator = FakeGenerator::new("unused");
    let engine = QaEngine::new(roster(), store, retriever, generator.clone(), 0.2);

    let err = engine
        .answer("When is Layla planning her trip to London?", true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::DataUnavailable(StoreError::DataUnavailable { .. })
    ));
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn test_empty_generation_is_an_error_not_an_answer() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = write_snapshot(&tmp);

    let store = CorpusStore::new(path, DownRemote::new(), Duration::from_secs(3600));
    let retriever = Retriever::new(Arc::new(BagOfWordsEmbedder), 64, 10);
    let generator = FakeGenerator::new("   ");
    let engine = QaEngine::new(roster(), store, retriever, generator, 0.2);

    let err = engine
        .answer("When is Layla planning her trip to London?", true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Generation(GenerationError::EmptyAnswer)
    ));
}

#[tokio::test]
async fn test_forced_refresh_with_remote_down_falls_back_to_snapshot() {
    let h = harness();

    let result = h
        .engine
        .answer("When is Layla planning her trip to London?", false)
        .await
        .unwrap();

    // Remote was attempted, failed, and the snapshot answered instead.
    assert_eq!(h.remote.call_count(), 1);
    assert_eq!(result.metadata.person.as_deref(), Some("Layla Kawaguchi"));
    assert!(!result.metadata.used_cached_data);
}

#[tokio::test]
async fn test_stats_reflect_snapshot_corpus() {
    let h = harness();

    let stats = h.engine.stats().await.unwrap();
    assert_eq!(stats.total_messages, 3);
    assert_eq!(stats.total_members, 3);
    assert_eq!(stats.generation_model, "fake-llm");
    assert!(stats.generation_available);
    assert_eq!(
        stats.member_message_counts[0],
        ("Layla Kawaguchi".to_string(), 2)
    );
}

#[tokio::test]
async fn test_answer_result_serializes_wire_shape() {
    let h = harness();

    let result = h
        .engine
        .answer("When is Layla planning her trip to London?", true)
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert!(json.get("answer").is_some());
    assert!(json.get("confidence").is_some());
    let meta = json.get("metadata").unwrap();
    assert_eq!(meta.get("person").unwrap(), "Layla Kawaguchi");
    assert_eq!(meta.get("retrieval_method").unwrap(), "semantic");
    assert!(meta.get("used_cached_data").is_some());
}
