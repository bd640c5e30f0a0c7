//! Text generation backends plus retry logic for the HTTP-based ones.
//!
//! Retries on transient errors (429 rate limit, 5xx server errors, network
//! timeouts). Does NOT retry on client errors (400, 401, 403, 404).

use anyhow::{Context, Result};
use aria_core::config::GenerationConfig;
use aria_core::Generator;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for each subsequent delay.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::INTERNAL_SERVER_ERROR
        || status == StatusCode::BAD_GATEWAY
        || status == StatusCode::SERVICE_UNAVAILABLE
        || status == StatusCode::GATEWAY_TIMEOUT
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Execute an async HTTP operation with retry logic. Returns the successful
/// `Response`, or the last error once `max_attempts` is exhausted.
async fn with_retry<F, Fut>(config: &RetryConfig, provider: &str, operation: F) -> Result<Response>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Response>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    if attempt > 1 {
                        tracing::info!("{} succeeded on attempt {}", provider, attempt);
                    }
                    return Ok(response);
                }

                if !is_retryable_status(status) {
                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("{} API error ({}): {}", provider, status, error_text);
                }

                let error_text = response.text().await.unwrap_or_default();
                tracing::warn!(
                    "{} returned {} on attempt {}/{}: {}",
                    provider,
                    status,
                    attempt,
                    config.max_attempts,
                    error_text.chars().take(200).collect::<String>()
                );
                last_error = Some(format!("{} ({}): {}", provider, status, error_text));
            }
            Err(e) => {
                tracing::warn!(
                    "{} network error on attempt {}/{}: {}",
                    provider,
                    attempt,
                    config.max_attempts,
                    e
                );
                last_error = Some(format!("{}: {}", provider, e));
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(delay).await;
            delay = Duration::from_secs_f64(
                (delay.as_secs_f64() * config.backoff_factor).min(config.max_delay.as_secs_f64()),
            );
        }
    }

    anyhow::bail!(
        "All {} attempts against {} failed. Last error: {}",
        config.max_attempts,
        provider,
        last_error.unwrap_or_else(|| "unknown".to_string())
    )
}

/// Pick a generator for the configured provider. Missing credentials degrade
/// to the offline generator rather than failing startup.
pub fn build(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "offline" => Ok(Arc::new(OfflineGenerator)),
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY").ok();
            match api_key {
                Some(key) => Ok(Arc::new(HttpGenerator::new(
                    config,
                    "https://api.openai.com/v1",
                    Some(key),
                )?)),
                None => {
                    tracing::warn!("OPENAI_API_KEY not set, answering from local knowledge only");
                    Ok(Arc::new(OfflineGenerator))
                }
            }
        }
        "ollama" => Ok(Arc::new(HttpGenerator::new(
            config,
            "http://localhost:11434/v1",
            None,
        )?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct HttpGenerator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryConfig,
}

impl HttpGenerator {
    pub fn new(config: &GenerationConfig, default_base: &str, api_key: Option<String>) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .context("Failed to build HTTP client")?,
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry: RetryConfig::default(),
        })
    }
}

fn system_prompt(context: &str) -> String {
    let mut prompt = String::from(
        "You are Aria, a concise personal assistant. \
         Answer in one or two sentences suitable for being read aloud.",
    );
    if !context.is_empty() {
        prompt.push_str("\n\nUse this context when it is relevant:\n");
        prompt.push_str(context);
    }
    prompt
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt(context) },
                { "role": "user", "content": question },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = with_retry(&self.retry, &self.model, || {
            let mut request = self.client.post(&url).json(&payload);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key));
            }
            async move { request.send().await.context("Failed to send request") }
        })
        .await?;

        let body: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse completion response")?;
        let answer = body["choices"][0]["message"]["content"]
            .as_str()
            .context("Completion response carried no text")?;

        Ok(answer.trim().to_string())
    }
}

/// Fallback when no language model is reachable: answer straight from the
/// retrieved context.
pub struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    async fn generate(&self, _question: &str, context: &str) -> Result<String> {
        if context.is_empty() {
            return Ok("I don't have an answer for that yet.".to_string());
        }
        let first = context.split("\n\n").next().unwrap_or(context);
        Ok(format!("Here's what I remember: {}", first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_system_prompt_embeds_context() {
        assert!(!system_prompt("").contains("context"));
        let prompt = system_prompt("Question: x\nAnswer: y");
        assert!(prompt.contains("Question: x"));
    }

    #[tokio::test]
    async fn test_offline_generator_uses_first_context_block() {
        let gen = OfflineGenerator;
        let empty = gen.generate("anything", "").await.unwrap();
        assert_eq!(empty, "I don't have an answer for that yet.");

        let grounded = gen
            .generate("anything", "first fact\n\nsecond fact")
            .await
            .unwrap();
        assert_eq!(grounded, "Here's what I remember: first fact");
    }

    #[test]
    fn test_build_rejects_unknown_provider() {
        let mut config = GenerationConfig::default();
        config.provider = "carrier-pigeon".to_string();
        assert!(build(&config).is_err());
    }
}
