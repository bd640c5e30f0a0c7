use crate::context::ContextComposer;
use crate::embedding::{Embedder, Embedding};
use crate::knowledge::{KnowledgeStore, Metadata};
use crate::store::LearningStore;
use anyhow::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Deterministic bag-of-words embedder so tests never touch a real model.
/// Texts sharing words get higher inner-product similarity.
struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    fn new() -> Self {
        Self { dim: 256 }
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut v = vec![0.0f32; self.dim];
        for word in text.to_lowercase().split_whitespace() {
            let mut h = DefaultHasher::new();
            word.hash(&mut h);
            v[(h.finish() as usize) % self.dim] += 1.0;
        }
        Ok(v)
    }
}

fn test_store(dir: &std::path::Path) -> KnowledgeStore {
    KnowledgeStore::open(dir, Some(Arc::new(HashEmbedder::new()))).expect("open store")
}

fn meta(kind: &str) -> Metadata {
    let mut m = Metadata::new();
    m.insert("type".into(), kind.into());
    m
}

// ============================================================================
// KnowledgeStore
// ============================================================================

#[tokio::test]
async fn test_add_keeps_parallel_arrays_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(dir.path());

    for i in 0..3 {
        let pos = store
            .add(&format!("document number {}", i), meta("test"))
            .await
            .expect("add failed");
        assert_eq!(pos, i, "insertion position must equal index");
    }
    assert_eq!(store.len().await, 3);

    // Reopen from the snapshot: counts and content survive.
    drop(store);
    let reopened = test_store(dir.path());
    assert_eq!(reopened.len().await, 3);
    let hits = reopened.search("document number 1", 3).await;
    assert_eq!(hits.len(), 3);
}

#[tokio::test]
async fn test_search_ranks_by_similarity_and_caps_at_corpus_size() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(dir.path());

    store
        .add("rust is a systems programming language", meta("doc"))
        .await
        .unwrap();
    store.add("pasta recipes for dinner", meta("doc")).await.unwrap();
    store
        .add("rust code compiles to native binaries", meta("doc"))
        .await
        .unwrap();

    let hits = store.search("rust programming code", 2).await;
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score, "scores must be non-increasing");
    assert!(hits[0].text.contains("rust"));

    // k larger than the corpus returns every document, still ordered.
    let all = store.search("rust", 10).await;
    assert_eq!(all.len(), 3);
    for pair in all.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_search_empty_corpus_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(dir.path());
    assert!(store.search("anything", 5).await.is_empty());
}

#[tokio::test]
async fn test_store_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let store = KnowledgeStore::open(dir.path(), None).unwrap();

    assert!(store.search("anything", 5).await.is_empty());
    assert!(store.add("text", Metadata::new()).await.is_err());

    let stats = store.stats().await;
    assert!(!stats.model_loaded);
    assert_eq!(stats.total_documents, 0);
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("vectors.bin"), b"not bincode").unwrap();
    std::fs::write(dir.path().join("metadata.json"), b"{ broken").unwrap();

    let store = test_store(dir.path());
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn test_find_relevant_context_respects_budget() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(dir.path());

    // Three 300-char documents that all match the query word.
    for fill in ["a", "b", "c"] {
        let doc = format!("topic {}", fill.repeat(294));
        assert_eq!(doc.chars().count(), 300);
        store.add(&doc, meta("doc")).await.unwrap();
    }

    // Two full documents fit (300 + 2 + 300 = 602); the third would need a
    // 46-char fragment, below the 100-char minimum, so it is dropped.
    let context = store.find_relevant_context("topic", 650).await;
    assert_eq!(context.chars().count(), 602);
    assert_eq!(context.matches("topic").count(), 2);

    // One full document plus a truncated fragment filling the exact budget.
    let context = store.find_relevant_context("topic", 450).await;
    assert_eq!(context.chars().count(), 450);

    // The guarantee holds for arbitrary budgets.
    for max_len in [0, 50, 100, 299, 301, 900, 2000] {
        let context = store.find_relevant_context("topic", max_len).await;
        assert!(
            context.chars().count() <= max_len,
            "context overflowed budget {}",
            max_len
        );
    }
}

#[tokio::test]
async fn test_add_interaction_formats_qa_pair() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(dir.path());

    store
        .add_interaction("what is rust", "a systems language")
        .await
        .unwrap();

    let hits = store.search("what is rust", 1).await;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].text.starts_with("Question: what is rust"));
    assert!(hits[0].text.contains("Answer: a systems language"));
    assert_eq!(
        hits[0].metadata.get("type").and_then(|v| v.as_str()),
        Some("qa_pair")
    );
}

#[tokio::test]
async fn test_add_chunked_splits_by_word_windows() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(dir.path());

    let words: Vec<String> = (0..25).map(|i| format!("word{}", i)).collect();
    let text = words.join(" ");

    let added = store.add_chunked(&text, 10, meta("manual")).await.unwrap();
    assert_eq!(added, 3);
    assert_eq!(store.len().await, 3);

    let hits = store.search("word24", 3).await;
    let last_chunk = hits
        .iter()
        .find(|h| h.text.contains("word24"))
        .expect("chunk containing word24 should be retrievable");
    assert_eq!(
        last_chunk.metadata.get("chunk_id").and_then(|v| v.as_u64()),
        Some(2)
    );
}

#[tokio::test]
async fn test_context_composer_falls_back_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(test_store(dir.path()));
    let composer = ContextComposer::new(store.clone(), 3, 1000);

    assert_eq!(composer.compose("anything").await, "");
    assert_eq!(composer.topic_context("anything").await, "");

    store.add("ada lovelace wrote programs", meta("doc")).await.unwrap();
    let topic = composer.topic_context("ada lovelace").await;
    assert!(topic.contains("ada lovelace"));
}

// ============================================================================
// LearningStore
// ============================================================================

async fn memory_store() -> LearningStore {
    LearningStore::new(":memory:").await.expect("open learning store")
}

#[tokio::test]
async fn test_learn_then_lookup_increments_usage() {
    let store = memory_store().await;

    let learned = store
        .learn("when I say 'open calculator', launch the calculator app")
        .await
        .unwrap();
    assert!(learned);

    let response = store
        .lookup("could you please open calculator now")
        .await
        .unwrap();
    assert_eq!(
        response.as_deref(),
        Some("Executing: launch the calculator app")
    );

    let commands = store.custom_commands().await.unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].pattern, "open calculator");
    assert_eq!(commands[0].usage_count, 1);
}

#[tokio::test]
async fn test_learn_rejects_non_template_utterance() {
    let store = memory_store().await;
    let learned = store.learn("please just do something useful").await.unwrap();
    assert!(!learned);
    assert!(store.custom_commands().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_learn_requires_matching_quote_pair() {
    let store = memory_store().await;

    let learned = store
        .learn(r#"when i say 'lights", turn on the lights"#)
        .await
        .unwrap();
    assert!(!learned, "mismatched quotes must not parse");
    assert!(store.custom_commands().await.unwrap().is_empty());

    // Double quotes pair just as well as single ones.
    let learned = store
        .learn(r#"when i say "lights", turn on the lights"#)
        .await
        .unwrap();
    assert!(learned);
    let commands = store.custom_commands().await.unwrap();
    assert_eq!(commands[0].pattern, "lights");
    assert_eq!(commands[0].description, "turn on the lights");
}

#[tokio::test]
async fn test_relearn_preserves_usage_count() {
    let store = memory_store().await;

    store
        .learn("when i say 'lights', turn on the lights")
        .await
        .unwrap();
    store.lookup("lights please").await.unwrap();
    store.lookup("hit the lights").await.unwrap();

    // Re-teaching updates the behavior without wiping usage statistics.
    store
        .learn("when i say 'lights', dim the bedroom lights")
        .await
        .unwrap();

    let commands = store.custom_commands().await.unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].usage_count, 2);
    assert_eq!(commands[0].response, "Executing: dim the bedroom lights");
    assert_eq!(commands[0].description, "dim the bedroom lights");
}

#[tokio::test]
async fn test_lookup_first_registered_pattern_wins() {
    let store = memory_store().await;

    store.learn("when i say 'calc', first action").await.unwrap();
    store
        .learn("when i say 'calculator', second action")
        .await
        .unwrap();

    // Both patterns are substrings of the input; insertion order breaks the tie.
    let response = store.lookup("open the calculator").await.unwrap();
    assert_eq!(response.as_deref(), Some("Executing: first action"));
}

#[tokio::test]
async fn test_lookup_no_match_returns_none() {
    let store = memory_store().await;
    store.learn("when i say 'lights', turn on lights").await.unwrap();
    assert!(store.lookup("what's the weather").await.unwrap().is_none());
}

#[tokio::test]
async fn test_interaction_log_is_append_only_and_ordered() {
    let store = memory_store().await;

    store
        .log_interaction("open calculator", aria_core::InteractionKind::Command, "", true)
        .await;
    store
        .log_interaction(
            "open calculator",
            aria_core::InteractionKind::Response,
            "Opening calculator.",
            true,
        )
        .await;
    store
        .log_interaction("format c:", aria_core::InteractionKind::Command, "", false)
        .await;

    let history = store.recent_interactions(10).await.unwrap();
    assert_eq!(history.len(), 3);
    // Most recent first.
    assert_eq!(history[0].input, "format c:");
    assert!(!history[0].success);
    assert_eq!(history[1].kind, "response");

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_interactions, 3);
    assert_eq!(stats.custom_commands, 0);
}
