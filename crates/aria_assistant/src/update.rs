use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One updatable component (code checkout, knowledge base, plugin set).
#[async_trait]
pub trait UpdateSource: Send + Sync {
    fn name(&self) -> &str;
    /// Returns true when something actually changed.
    async fn update(&self) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct UpdateReport {
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<String>,
}

impl UpdateReport {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.updated.is_empty() {
            parts.push(format!("Updated: {}.", self.updated.join(", ")));
        }
        if !self.failed.is_empty() {
            parts.push(format!("Update failed for: {}.", self.failed.join(", ")));
        }
        if parts.is_empty() {
            parts.push("Everything is up to date.".to_string());
        }
        parts.join(" ")
    }
}

/// Runs registered update sources concurrently and reports per-source
/// outcomes. Failures are logged and reported, never silently swallowed.
#[derive(Default)]
pub struct UpdateManager {
    sources: Vec<Arc<dyn UpdateSource>>,
}

impl UpdateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn UpdateSource>) {
        self.sources.push(source);
    }

    pub async fn run_all(&self) -> UpdateReport {
        let mut tasks = Vec::new();
        for source in &self.sources {
            let source = source.clone();
            tasks.push(tokio::spawn(async move {
                let name = source.name().to_string();
                (name, source.update().await)
            }));
        }

        let mut report = UpdateReport::default();
        for task in tasks {
            match task.await {
                Ok((name, Ok(true))) => report.updated.push(name),
                Ok((name, Ok(false))) => report.unchanged.push(name),
                Ok((name, Err(e))) => {
                    tracing::error!("Update source '{}' failed: {}", name, e);
                    report.failed.push(name);
                }
                Err(e) => {
                    tracing::error!("Update task panicked: {}", e);
                    report.failed.push("unknown".to_string());
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        name: &'static str,
        outcome: Result<bool, &'static str>,
    }

    #[async_trait]
    impl UpdateSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn update(&self) -> Result<bool> {
            match self.outcome {
                Ok(changed) => Ok(changed),
                Err(msg) => Err(anyhow::anyhow!(msg)),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_manager_reports_up_to_date() {
        let manager = UpdateManager::new();
        let report = manager.run_all().await;
        assert_eq!(report.summary(), "Everything is up to date.");
    }

    #[tokio::test]
    async fn test_mixed_outcomes_are_all_reported() {
        let mut manager = UpdateManager::new();
        manager.register(Arc::new(FixedSource {
            name: "knowledge base",
            outcome: Ok(true),
        }));
        manager.register(Arc::new(FixedSource {
            name: "plugins",
            outcome: Ok(false),
        }));
        manager.register(Arc::new(FixedSource {
            name: "code",
            outcome: Err("network down"),
        }));

        let report = manager.run_all().await;
        assert_eq!(report.updated, vec!["knowledge base"]);
        assert_eq!(report.unchanged, vec!["plugins"]);
        assert_eq!(report.failed, vec!["code"]);

        let summary = report.summary();
        assert!(summary.contains("Updated: knowledge base"));
        assert!(summary.contains("Update failed for: code"));
    }
}
