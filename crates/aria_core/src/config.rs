use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AriaConfig {
    pub activation: ActivationConfig,
    pub security: SecurityConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub store: StoreConfig,
}

impl AriaConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: AriaConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ARIA_PROVIDER") {
            self.generation.provider = v;
        }
        if let Ok(v) = std::env::var("ARIA_MODEL") {
            self.generation.model = v;
        }
        if let Ok(v) = std::env::var("ARIA_BASE_URL") {
            self.generation.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("ARIA_DB") {
            self.store.db_path = v;
        }
        if let Ok(v) = std::env::var("ARIA_KNOWLEDGE_DIR") {
            self.store.knowledge_dir = v;
        }
        if let Ok(v) = std::env::var("ARIA_IDLE_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.activation.idle_timeout_secs = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Case-insensitive substrings that open an activation session.
    pub phrases: Vec<String>,
    /// One of these is spoken at random when a session opens.
    pub greetings: Vec<String>,
    /// Seconds of idle time before an open session auto-closes.
    pub idle_timeout_secs: u64,
    /// Seconds the loop pauses in the Error state before resuming.
    pub error_backoff_secs: u64,
    pub farewell: String,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            phrases: vec![
                "hey aria".to_string(),
                "okay aria".to_string(),
                "aria, wake up".to_string(),
            ],
            greetings: vec![
                "Yes?".to_string(),
                "I'm listening.".to_string(),
                "At your service.".to_string(),
                "How can I help?".to_string(),
            ],
            idle_timeout_secs: 30,
            error_backoff_secs: 1,
            farewell: "Shutting down. Goodbye!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Never executed, no prompting.
    pub blocked_patterns: Vec<String>,
    /// Executed only after an affirmative confirmation utterance.
    pub dangerous_patterns: Vec<String>,
    /// Same confirmation protocol as dangerous, softer prompt.
    pub caution_patterns: Vec<String>,
    /// Utterances that count as an affirmative confirmation.
    pub confirmation_tokens: Vec<String>,
    pub confirmation_timeout_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            blocked_patterns: vec![
                r"format\s+[cd]:".to_string(),
                r"del\s+/[sq]".to_string(),
                r"rm\s+-rf\s+/".to_string(),
                r"shutdown\s+/[fs]".to_string(),
                r"taskkill\s+/f".to_string(),
                r"net\s+user.*delete".to_string(),
            ],
            dangerous_patterns: vec![
                r"shutdown".to_string(),
                r"restart".to_string(),
                r"reboot".to_string(),
                r"power\s+off".to_string(),
                r"format".to_string(),
                r"delete\s+system".to_string(),
                r"kill\s+process".to_string(),
                r"terminate\s+all".to_string(),
            ],
            caution_patterns: vec![
                r"close\s+all".to_string(),
                r"kill\s+\w+".to_string(),
                r"delete\s+\w+".to_string(),
                r"remove\s+\w+".to_string(),
                r"uninstall".to_string(),
            ],
            confirmation_tokens: vec![
                "confirm".to_string(),
                "yes, do it".to_string(),
                "go ahead".to_string(),
                "i confirm".to_string(),
            ],
            confirmation_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// How many documents to retrieve for grounding.
    pub top_k: usize,
    /// Hard cap on grounding context length, in characters.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_context_chars: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: String,
    pub knowledge_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "aria.db".to_string(),
            knowledge_dir: "knowledge".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = AriaConfig::default();
        assert_eq!(cfg.activation.idle_timeout_secs, 30);
        assert_eq!(cfg.security.confirmation_timeout_secs, 10);
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.retrieval.max_context_chars, 1000);
        assert!(!cfg.activation.phrases.is_empty());
        assert!(!cfg.security.blocked_patterns.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[generation]
provider = "anthropic"
model = "claude-sonnet"
"#;
        let cfg: AriaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.generation.provider, "anthropic");
        assert_eq!(cfg.generation.model, "claude-sonnet");
        // Defaults for unspecified fields
        assert_eq!(cfg.activation.idle_timeout_secs, 30);
        assert_eq!(cfg.retrieval.top_k, 3);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[activation]
phrases = ["hello computer"]
greetings = ["hi"]
idle_timeout_secs = 45
error_backoff_secs = 2
farewell = "bye"

[security]
blocked_patterns = ["format\\s+c:"]
dangerous_patterns = ["shutdown"]
caution_patterns = ["uninstall"]
confirmation_tokens = ["confirm"]
confirmation_timeout_secs = 5

[retrieval]
top_k = 5
max_context_chars = 2000

[store]
db_path = "data/aria.db"
knowledge_dir = "data/knowledge"
"#;
        let cfg: AriaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.activation.phrases, vec!["hello computer"]);
        assert_eq!(cfg.activation.idle_timeout_secs, 45);
        assert_eq!(cfg.security.confirmation_timeout_secs, 5);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.retrieval.max_context_chars, 2000);
        assert_eq!(cfg.store.db_path, "data/aria.db");
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        std::env::set_var("ARIA_PROVIDER", "anthropic");
        std::env::set_var("ARIA_DB", "/tmp/override.db");

        let mut cfg = AriaConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.generation.provider, "anthropic");
        assert_eq!(cfg.store.db_path, "/tmp/override.db");

        std::env::remove_var("ARIA_PROVIDER");
        std::env::remove_var("ARIA_DB");

        let cfg = AriaConfig::load_or_default("/nonexistent/path.toml");
        assert_eq!(cfg.store.db_path, "aria.db");
    }
}
