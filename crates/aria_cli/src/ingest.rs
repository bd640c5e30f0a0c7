use anyhow::{Context, Result};
use aria_assistant::UpdateSource;
use aria_memory::{KnowledgeStore, Metadata};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Word-window size for splitting ingested documents.
const CHUNK_WORDS: usize = 120;

/// Feeds `.txt` files from a watched directory into the knowledge store when
/// the user asks the assistant to update itself. Already-ingested filenames
/// are tracked in a sidecar list so files are only indexed once.
pub struct DocsIngestSource {
    knowledge: Arc<KnowledgeStore>,
    docs_dir: PathBuf,
    state_path: PathBuf,
}

impl DocsIngestSource {
    pub fn new<P: AsRef<Path>>(knowledge: Arc<KnowledgeStore>, docs_dir: P) -> Self {
        let docs_dir = docs_dir.as_ref().to_path_buf();
        let state_path = docs_dir.join(".ingested.json");
        Self {
            knowledge,
            docs_dir,
            state_path,
        }
    }
}

fn load_ingested(state_path: &Path) -> Vec<String> {
    match std::fs::read(state_path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

fn save_ingested(state_path: &Path, names: &[String]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(names).context("Failed to serialize ingest state")?;
    std::fs::write(state_path, bytes)
        .with_context(|| format!("Failed to write {}", state_path.display()))?;
    Ok(())
}

/// Text files in `docs_dir` that are not in the ingested list, sorted by name.
fn new_files(docs_dir: &Path, ingested: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match std::fs::read_dir(docs_dir) {
        Ok(entries) => entries,
        // A missing docs dir just means there is nothing to ingest.
        Err(_) => return Ok(files),
    };

    for entry in entries {
        let path = entry.context("Failed to read docs directory entry")?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if !ingested.iter().any(|i| i == &name) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl UpdateSource for DocsIngestSource {
    fn name(&self) -> &str {
        "knowledge base"
    }

    async fn update(&self) -> Result<bool> {
        let mut ingested = load_ingested(&self.state_path);
        let pending = new_files(&self.docs_dir, &ingested)?;
        if pending.is_empty() {
            return Ok(false);
        }

        for path in pending {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let mut metadata = Metadata::new();
            metadata.insert("source".into(), name.clone().into());
            metadata.insert("type".into(), "document".into());
            let chunks = self
                .knowledge
                .add_chunked(&text, CHUNK_WORDS, metadata)
                .await
                .with_context(|| format!("Failed to index {}", name))?;
            tracing::info!("Ingested {} as {} chunks", name, chunks);

            ingested.push(name);
            save_ingested(&self.state_path, &ingested)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_files_skips_ingested_and_non_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
        std::fs::write(dir.path().join("notes.md"), "skip").unwrap();

        let pending = new_files(dir.path(), &["a.txt".to_string()]).unwrap();
        let names: Vec<_> = pending
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["b.txt"]);
    }

    #[test]
    fn test_new_files_tolerates_missing_dir() {
        let pending = new_files(Path::new("/nonexistent/docs"), &[]).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_ingest_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join(".ingested.json");
        assert!(load_ingested(&state).is_empty());

        save_ingested(&state, &["a.txt".to_string()]).unwrap();
        assert_eq!(load_ingested(&state), vec!["a.txt"]);
    }
}
