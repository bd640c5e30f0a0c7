//! Built-in intent handlers for the terminal build. Each one is a thin
//! adapter from an utterance to a local process or a public HTTP endpoint.

use anyhow::{Context, Result};
use aria_assistant::{Intent, PluginRegistry};
use aria_core::Plugin;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Registry with every plugin this binary ships. Intents without a handler
/// (screen analysis, music) fall back to the controller's unavailable reply.
pub fn default_registry() -> Result<PluginRegistry> {
    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent("aria-assistant")
        .build()
        .context("Failed to build HTTP client")?;

    let mut registry = PluginRegistry::new();
    registry.register(Intent::OpenApp, Arc::new(AppLauncher));
    registry.register(Intent::CloseApp, Arc::new(AppCloser));
    registry.register(
        Intent::Weather,
        Arc::new(WeatherPlugin {
            client: client.clone(),
        }),
    );
    registry.register(Intent::WebSearch, Arc::new(SearchPlugin { client }));
    registry.register(Intent::SystemPower, Arc::new(PowerPlugin));
    Ok(registry)
}

/// First word after any of the keywords (matched as whole words), skipping
/// filler words.
fn target_word(text: &str, keywords: &[&str]) -> Option<String> {
    let words: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect();
    let at = words
        .iter()
        .position(|w| keywords.contains(&w.as_str()))?;
    words[at + 1..]
        .iter()
        .find(|w| !matches!(w.as_str(), "the" | "a" | "an" | "my" | "up" | "please"))
        .cloned()
}

struct AppLauncher;

#[async_trait]
impl Plugin for AppLauncher {
    async fn handle(&self, text: &str) -> Result<String> {
        let app = target_word(text, &["open", "launch"])
            .context("No application named in the command")?;
        tokio::process::Command::new(&app)
            .spawn()
            .with_context(|| format!("Failed to launch {}", app))?;
        Ok(format!("Opening {}.", app))
    }
}

struct AppCloser;

#[async_trait]
impl Plugin for AppCloser {
    async fn handle(&self, text: &str) -> Result<String> {
        let app = target_word(text, &["close"])
            .context("No application named in the command")?;
        let status = tokio::process::Command::new("pkill")
            .arg(&app)
            .status()
            .await
            .context("Failed to run pkill")?;
        if status.success() {
            Ok(format!("Closed {}.", app))
        } else {
            Ok(format!("I couldn't find {} running.", app))
        }
    }
}

struct WeatherPlugin {
    client: Client,
}

#[async_trait]
impl Plugin for WeatherPlugin {
    async fn handle(&self, text: &str) -> Result<String> {
        // "weather in <place>" picks the place; otherwise wttr.in geolocates.
        let location = target_word(text, &["in"]).unwrap_or_default();
        let url = format!("https://wttr.in/{}?format=3", location);
        let report = self
            .client
            .get(&url)
            .send()
            .await
            .context("Weather service unreachable")?
            .error_for_status()
            .context("Weather service returned an error")?
            .text()
            .await
            .context("Failed to read weather report")?;
        Ok(report.trim().to_string())
    }
}

struct SearchPlugin {
    client: Client,
}

/// Strip the search keywords so only the query remains.
fn search_query(text: &str) -> String {
    let lower = text.to_lowercase();
    for prefix in ["search for", "look up", "search"] {
        if let Some((_, rest)) = lower.split_once(prefix) {
            return rest.trim().to_string();
        }
    }
    lower.trim().to_string()
}

#[async_trait]
impl Plugin for SearchPlugin {
    async fn handle(&self, text: &str) -> Result<String> {
        let query = search_query(text);
        if query.is_empty() {
            return Ok("What should I search for?".to_string());
        }

        let body: serde_json::Value = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[("q", query.as_str()), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .context("Search service unreachable")?
            .json()
            .await
            .context("Failed to parse search response")?;

        let abstract_text = body["AbstractText"].as_str().unwrap_or("");
        if !abstract_text.is_empty() {
            return Ok(abstract_text.to_string());
        }
        let related = body["RelatedTopics"][0]["Text"].as_str().unwrap_or("");
        if !related.is_empty() {
            return Ok(related.to_string());
        }
        Ok(format!("I couldn't find a quick answer for {}.", query))
    }
}

struct PowerPlugin;

#[async_trait]
impl Plugin for PowerPlugin {
    #[cfg(unix)]
    async fn handle(&self, text: &str) -> Result<String> {
        let text = text.to_lowercase();
        let (verb, reply) = if text.contains("restart") || text.contains("reboot") {
            ("reboot", "Restarting the system now.")
        } else {
            ("poweroff", "Shutting the system down now.")
        };
        tokio::process::Command::new("systemctl")
            .arg(verb)
            .spawn()
            .with_context(|| format!("Failed to run systemctl {}", verb))?;
        Ok(reply.to_string())
    }

    #[cfg(not(unix))]
    async fn handle(&self, _text: &str) -> Result<String> {
        anyhow::bail!("Power control is not supported on this platform")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_word_skips_filler() {
        assert_eq!(
            target_word("open the calculator please", &["open", "launch"]),
            Some("calculator".to_string())
        );
        assert_eq!(
            target_word("launch firefox", &["open", "launch"]),
            Some("firefox".to_string())
        );
        assert_eq!(target_word("open", &["open"]), None);
        assert_eq!(target_word("what time is it", &["open"]), None);
    }

    #[test]
    fn test_search_query_strips_keywords() {
        assert_eq!(search_query("search for rust tutorials"), "rust tutorials");
        assert_eq!(search_query("look up the eiffel tower"), "the eiffel tower");
        assert_eq!(search_query("search"), "");
    }
}
