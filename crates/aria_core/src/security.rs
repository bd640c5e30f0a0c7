use crate::config::SecurityConfig;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================================================
// Verdict types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Safe,
    Caution,
    Dangerous,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    System,
    File,
    Network,
    Application,
    Voice,
    Learning,
    General,
}

/// Output of the classifier. Derived per utterance, never persisted.
#[derive(Debug, Clone)]
pub struct SecurityVerdict {
    pub level: SecurityLevel,
    pub category: CommandCategory,
    pub message: String,
}

impl SecurityVerdict {
    pub fn requires_confirmation(&self) -> bool {
        matches!(self.level, SecurityLevel::Dangerous | SecurityLevel::Caution)
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Stateless command risk classifier.
///
/// Three ordered pattern tiers are checked against the lower-cased utterance:
/// Blocked, then Dangerous, then Caution. The first tier with a matching
/// pattern wins; no match anywhere means Safe. Pending confirmations are the
/// controller's business, never remembered here.
pub struct SecurityClassifier {
    blocked: Vec<Regex>,
    dangerous: Vec<Regex>,
    caution: Vec<Regex>,
    categories: Vec<(CommandCategory, Vec<&'static str>)>,
}

impl SecurityClassifier {
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        Ok(Self {
            blocked: compile_patterns(&config.blocked_patterns)?,
            dangerous: compile_patterns(&config.dangerous_patterns)?,
            caution: compile_patterns(&config.caution_patterns)?,
            categories: default_categories(),
        })
    }

    pub fn classify(&self, command: &str) -> SecurityVerdict {
        let command = command.to_lowercase();
        let command = command.trim();

        if self.blocked.iter().any(|p| p.is_match(command)) {
            return SecurityVerdict {
                level: SecurityLevel::Blocked,
                category: CommandCategory::System,
                message: "This command is blocked for safety reasons.".to_string(),
            };
        }

        if self.dangerous.iter().any(|p| p.is_match(command)) {
            return SecurityVerdict {
                level: SecurityLevel::Dangerous,
                category: self.category_of(command),
                message: "Dangerous command - confirmation required.".to_string(),
            };
        }

        if self.caution.iter().any(|p| p.is_match(command)) {
            return SecurityVerdict {
                level: SecurityLevel::Caution,
                category: self.category_of(command),
                message: "This command needs care - confirmation required.".to_string(),
            };
        }

        SecurityVerdict {
            level: SecurityLevel::Safe,
            category: self.category_of(command),
            message: "Command is safe.".to_string(),
        }
    }

    /// Prompt spoken to the user when a verdict requires confirmation.
    pub fn confirmation_prompt(&self, command: &str, verdict: &SecurityVerdict) -> String {
        match verdict.level {
            SecurityLevel::Dangerous => format!(
                "'{}' is a dangerous command. Say 'confirm' to execute or anything else to cancel.",
                command
            ),
            SecurityLevel::Caution => format!(
                "'{}' needs care. Say 'confirm' to proceed or anything else to cancel.",
                command
            ),
            _ => String::new(),
        }
    }

    fn category_of(&self, command: &str) -> CommandCategory {
        for (category, keywords) in &self.categories {
            if keywords.iter().any(|k| command.contains(k)) {
                return *category;
            }
        }
        CommandCategory::General
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("Invalid security pattern: '{}'", p)))
        .collect()
}

fn default_categories() -> Vec<(CommandCategory, Vec<&'static str>)> {
    vec![
        (
            CommandCategory::System,
            vec!["shutdown", "restart", "reboot", "sleep", "lock", "power off"],
        ),
        (
            CommandCategory::Application,
            vec!["open", "launch", "close", "start"],
        ),
        (
            CommandCategory::File,
            vec!["create file", "delete file", "copy", "move"],
        ),
        (
            CommandCategory::Network,
            vec!["search", "download", "send", "upload"],
        ),
        (
            CommandCategory::Voice,
            vec!["speak", "mute", "louder", "quieter"],
        ),
        (
            CommandCategory::Learning,
            vec!["learn", "remember", "forget"],
        ),
    ]
}

/// Does the utterance count as an affirmative confirmation?
/// Anything that is not affirmative is a cancellation, never a retry.
pub fn is_affirmative(text: &str, tokens: &[String]) -> bool {
    let text = text.to_lowercase();
    tokens.iter().any(|t| text.contains(&t.to_lowercase()))
}

// ============================================================================
// Tests
// ============================================================================
