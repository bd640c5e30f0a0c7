use crate::embedding::{dot, l2_normalize, Embedder, Embedding};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Minimum remaining budget (characters) before a truncated fragment is worth
/// appending to the grounding context.
const MIN_PARTIAL_FRAGMENT_CHARS: usize = 100;

/// One retrieval result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
    pub position: usize,
}

/// On-disk document/metadata snapshot. Vectors live in a sibling bincode file.
#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    documents: Vec<String>,
    metadata: Vec<Metadata>,
}

#[derive(Default)]
struct Inner {
    documents: Vec<String>,
    metadata: Vec<Metadata>,
    vectors: Vec<Embedding>,
}

impl Inner {
    fn len(&self) -> usize {
        self.documents.len()
    }
}

/// Embedding retrieval engine over parallel document/metadata/vector arrays.
///
/// Documents are immutable once added and identified by insertion position;
/// positions are never reused (no deletion). Every successful `add` rewrites
/// the full snapshot before returning, making `add` the single synchronization
/// point — all mutation goes through one write lock.
pub struct KnowledgeStore {
    embedder: Option<Arc<dyn Embedder>>,
    inner: RwLock<Inner>,
    vectors_path: PathBuf,
    snapshot_path: PathBuf,
}

impl KnowledgeStore {
    /// Open a store rooted at `dir`, loading the last persisted snapshot if
    /// one exists. A missing or corrupt snapshot starts the store empty (a
    /// crash mid-write is recovered by reloading whatever last persisted).
    pub fn open<P: AsRef<Path>>(dir: P, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create knowledge dir: {}", dir.display()))?;

        let vectors_path = dir.join("vectors.bin");
        let snapshot_path = dir.join("metadata.json");
        let inner = load_snapshot(&vectors_path, &snapshot_path);

        Ok(Self {
            embedder,
            inner: RwLock::new(inner),
            vectors_path,
            snapshot_path,
        })
    }

    /// Embed, normalize and append a document, then persist the full state
    /// synchronously. Returns the insertion position.
    pub async fn add(&self, text: &str, metadata: Metadata) -> Result<usize> {
        let embedder = self
            .embedder
            .as_ref()
            .context("Embedding model unavailable")?;
        let mut vector = embedder
            .embed(text)
            .context("Failed to embed document")?;
        l2_normalize(&mut vector);

        let mut inner = self.inner.write().await;
        inner.documents.push(text.to_string());
        inner.metadata.push(metadata);
        inner.vectors.push(vector);

        if let Err(e) = self.persist(&inner) {
            // The appended entry must not outlive a failed persist, otherwise
            // memory and disk drift apart.
            inner.documents.pop();
            inner.metadata.pop();
            inner.vectors.pop();
            tracing::warn!("Failed to persist knowledge snapshot: {}", e);
            return Err(aria_core::AssistantError::Persistence(e).into());
        }

        Ok(inner.len() - 1)
    }

    /// Convenience wrapper for indexing a question/answer exchange.
    pub async fn add_interaction(&self, input: &str, response: &str) -> Result<usize> {
        let text = format!("Question: {}\nAnswer: {}", input, response);
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), "interaction".into());
        metadata.insert("type".into(), "qa_pair".into());
        metadata.insert("user_input".into(), input.into());
        metadata.insert("response".into(), response.into());
        self.add(&text, metadata).await
    }

    /// Split a long text into word windows and add each chunk. Returns the
    /// number of chunks added.
    pub async fn add_chunked(
        &self,
        text: &str,
        chunk_words: usize,
        base_metadata: Metadata,
    ) -> Result<usize> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut added = 0;
        for (i, window) in words.chunks(chunk_words.max(1)).enumerate() {
            let chunk = window.join(" ");
            if chunk.trim().is_empty() {
                continue;
            }
            let mut metadata = base_metadata.clone();
            metadata.insert("chunk_id".into(), (i as u64).into());
            self.add(&chunk, metadata).await?;
            added += 1;
        }
        Ok(added)
    }

    /// Top `min(k, n)` documents by inner-product similarity, descending.
    /// Empty corpus or unavailable model yields an empty list, not an error.
    pub async fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        let embedder = match &self.embedder {
            Some(e) => e,
            None => return Vec::new(),
        };

        let inner = self.inner.read().await;
        if inner.len() == 0 || k == 0 {
            return Vec::new();
        }

        let mut query_vec = match embedder.embed(query) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to embed query: {}", e);
                return Vec::new();
            }
        };
        l2_normalize(&mut query_vec);

        let mut hits: Vec<SearchHit> = inner
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| SearchHit {
                text: inner.documents[i].clone(),
                metadata: inner.metadata[i].clone(),
                score: dot(&query_vec, v),
                position: i,
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k.min(inner.len()));
        hits
    }

    /// Assemble grounding context from the top 3 results, greedily concatenated
    /// with blank-line separators. The returned string never exceeds `max_len`
    /// characters, separators included. A candidate that would overflow is
    /// truncated to the remaining budget only when at least 100 characters of
    /// space remain; concatenation stops there either way.
    pub async fn find_relevant_context(&self, query: &str, max_len: usize) -> String {
        let results = self.search(query, 3).await;

        let mut parts: Vec<String> = Vec::new();
        let mut used = 0usize;

        for hit in results {
            let sep = if parts.is_empty() { 0 } else { 2 };
            let text_len = hit.text.chars().count();

            if used + sep + text_len <= max_len {
                used += sep + text_len;
                parts.push(hit.text);
            } else {
                let remaining = max_len.saturating_sub(used + sep);
                if remaining >= MIN_PARTIAL_FRAGMENT_CHARS {
                    let fragment: String = hit.text.chars().take(remaining).collect();
                    parts.push(fragment);
                }
                break;
            }
        }

        parts.join("\n\n")
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> KnowledgeStats {
        let inner = self.inner.read().await;
        KnowledgeStats {
            total_documents: inner.len(),
            dimension: self.embedder.as_ref().map(|e| e.dimension()),
            model_loaded: self.embedder.is_some(),
        }
    }

    /// Full snapshot rewrite: vectors as bincode, documents/metadata as JSON.
    /// Each file is written to a temp sibling and renamed into place.
    fn persist(&self, inner: &Inner) -> Result<()> {
        let vec_bytes =
            bincode::serialize(&inner.vectors).context("Failed to serialize vectors")?;
        write_atomic(&self.vectors_path, &vec_bytes)?;

        let snapshot = Snapshot {
            documents: inner.documents.clone(),
            metadata: inner.metadata.clone(),
        };
        let snap_bytes =
            serde_json::to_vec_pretty(&snapshot).context("Failed to serialize snapshot")?;
        write_atomic(&self.snapshot_path, &snap_bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeStats {
    pub total_documents: usize,
    pub dimension: Option<usize>,
    pub model_loaded: bool,
}

fn load_snapshot(vectors_path: &Path, snapshot_path: &Path) -> Inner {
    if !vectors_path.exists() || !snapshot_path.exists() {
        return Inner::default();
    }
    let loaded = (|| -> Result<Inner> {
        let vec_bytes = std::fs::read(vectors_path)?;
        let vectors: Vec<Embedding> = bincode::deserialize(&vec_bytes)?;
        let snap_bytes = std::fs::read(snapshot_path)?;
        let snapshot: Snapshot = serde_json::from_slice(&snap_bytes)?;
        Ok(Inner {
            documents: snapshot.documents,
            metadata: snapshot.metadata,
            vectors,
        })
    })();

    match loaded {
        Ok(mut inner) => {
            // A crash between the two file writes can leave the arrays uneven;
            // keep the common prefix.
            let n = inner
                .documents
                .len()
                .min(inner.metadata.len())
                .min(inner.vectors.len());
            inner.documents.truncate(n);
            inner.metadata.truncate(n);
            inner.vectors.truncate(n);
            tracing::info!("Loaded {} documents from knowledge snapshot", n);
            inner
        }
        Err(e) => {
            tracing::warn!("Failed to load knowledge snapshot, starting empty: {}", e);
            Inner::default()
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
