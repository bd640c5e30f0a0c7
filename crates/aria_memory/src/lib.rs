pub mod context;
pub mod embedding;
pub mod knowledge;
pub mod store;

pub use context::ContextComposer;
pub use embedding::{dot, l2_normalize, Embedder, Embedding, TextEmbedder};
pub use knowledge::{KnowledgeStats, KnowledgeStore, Metadata, SearchHit};
pub use store::{LearningStats, LearningStore};

#[cfg(test)]
mod tests;
