use crate::knowledge::KnowledgeStore;
use std::sync::Arc;

/// Builds the bounded grounding context handed to the generation service.
/// Empty retrieval yields an empty string; the generator must tolerate that.
pub struct ContextComposer {
    knowledge: Arc<KnowledgeStore>,
    top_k: usize,
    max_context_chars: usize,
}

impl ContextComposer {
    pub fn new(knowledge: Arc<KnowledgeStore>, top_k: usize, max_context_chars: usize) -> Self {
        Self {
            knowledge,
            top_k,
            max_context_chars,
        }
    }

    /// Grounding context for a general question.
    pub async fn compose(&self, question: &str) -> String {
        self.knowledge
            .find_relevant_context(question, self.max_context_chars)
            .await
    }

    /// Context for an explicit "what do you know about X" query: the two best
    /// matching documents, joined verbatim.
    pub async fn topic_context(&self, query: &str) -> String {
        let hits = self.knowledge.search(query, self.top_k).await;
        hits.iter()
            .take(2)
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
