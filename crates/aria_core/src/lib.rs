pub mod config;
pub mod error;
pub mod security;

pub use config::AriaConfig;
pub use error::AssistantError;
pub use security::{CommandCategory, SecurityClassifier, SecurityLevel, SecurityVerdict};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What kind of interaction a log record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionKind {
    Command,
    Response,
    Question,
    Learning,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Command => "command",
            InteractionKind::Response => "response",
            InteractionKind::Question => "question",
            InteractionKind::Learning => "learning",
        }
    }
}

/// One logged exchange with the user. Append-only; never mutated by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: i64,
    pub input: String,
    pub response: String,
    pub kind: String,
    pub success: bool,
}

/// A user-taught pattern → response association.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCommand {
    pub pattern: String,
    pub description: String,
    pub response: String,
    pub usage_count: i64,
    pub created_at: i64,
}

/// Captures utterances. A `None` result means the wait timed out, which is a
/// normal outcome, not an error.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn listen_for_activation(&self) -> anyhow::Result<Option<String>>;
    async fn listen(&self, timeout: Duration) -> anyhow::Result<Option<String>>;
}

#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, text: &str) -> anyhow::Result<()>;
}

/// The generative-text backend. Must tolerate an empty grounding context.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, question: &str, context: &str) -> anyhow::Result<String>;
}

/// An intent handler invoked by the controller's dispatch table.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn handle(&self, text: &str) -> anyhow::Result<String>;
}
