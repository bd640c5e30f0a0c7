use anyhow::{Context, Result};
use aria_core::{CustomCommand, Interaction, InteractionKind};
use regex::Regex;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

/// Learned command patterns and the append-only interaction log.
///
/// Lookup order is deterministic: patterns are checked in insertion order
/// (`ORDER BY id`), first match wins.
#[derive(Clone)]
pub struct LearningStore {
    pool: Pool<Sqlite>,
    learn_template: Regex,
}

impl LearningStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        // One connection keeps writes serialized across callers (the main
        // loop and any remote-control channel share this store).
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self {
            pool,
            // Quote characters must pair: 'pattern' or "pattern", never mixed.
            learn_template: Regex::new(r#"when i say (?:'([^']+)'|"([^"]+)"),?\s*(.+)"#)
                .expect("learn template regex is valid"),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                user_input TEXT NOT NULL,
                response TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,
                success INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create interactions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS custom_commands (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                response TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create custom_commands table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_interactions_timestamp ON interactions(timestamp)")
            .execute(&self.pool)
            .await
            .context("Failed to create interactions timestamp index")?;

        Ok(())
    }

    /// Teach a new command from the fixed template
    /// `when I say '<pattern>', <description>`.
    ///
    /// Returns `false` (not an error) when the utterance doesn't match the
    /// template. Re-teaching an existing pattern overwrites its description
    /// and response but keeps the accumulated usage_count.
    pub async fn learn(&self, utterance: &str) -> Result<bool> {
        let utterance = utterance.to_lowercase();
        let captures = match self.learn_template.captures(&utterance) {
            Some(c) => c,
            None => {
                tracing::warn!("Could not parse learning utterance: {}", utterance);
                return Ok(false);
            }
        };

        let pattern = match captures.get(1).or_else(|| captures.get(2)) {
            Some(m) => m.as_str().trim().to_string(),
            None => return Ok(false),
        };
        let description = captures[3].trim().to_string();
        let response = format!("Executing: {}", description);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO custom_commands (pattern, description, response, usage_count, created_at)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(pattern) DO UPDATE SET
                description = excluded.description,
                response = excluded.response
            "#,
        )
        .bind(&pattern)
        .bind(&description)
        .bind(&response)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to upsert custom command")?;

        tracing::info!("Learned custom command: {}", pattern);
        Ok(true)
    }

    /// First stored pattern (insertion order) that is a case-insensitive
    /// substring of the input. Increments that command's usage_count.
    pub async fn lookup(&self, input: &str) -> Result<Option<String>> {
        let rows = sqlx::query("SELECT id, pattern, response FROM custom_commands ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch custom commands")?;

        let input_lower = input.to_lowercase();

        for row in rows {
            let pattern: String = row.get("pattern");
            if input_lower.contains(&pattern.to_lowercase()) {
                let id: i64 = row.get("id");
                sqlx::query("UPDATE custom_commands SET usage_count = usage_count + 1 WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .context("Failed to bump usage_count")?;
                return Ok(Some(row.get("response")));
            }
        }

        Ok(None)
    }

    /// Append an interaction record. Persistence faults degrade to a warning;
    /// this never fails the caller.
    pub async fn log_interaction(
        &self,
        input: &str,
        kind: InteractionKind,
        response: &str,
        success: bool,
    ) {
        let result = sqlx::query(
            "INSERT INTO interactions (timestamp, user_input, response, kind, success) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(input)
        .bind(response)
        .bind(kind.as_str())
        .bind(success)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to log interaction: {}", e);
        }
    }

    pub async fn recent_interactions(&self, limit: i64) -> Result<Vec<Interaction>> {
        let rows = sqlx::query(
            "SELECT timestamp, user_input, response, kind, success FROM interactions ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch interaction history")?;

        Ok(rows
            .into_iter()
            .map(|row| Interaction {
                timestamp: row.get("timestamp"),
                input: row.get("user_input"),
                response: row.get("response"),
                kind: row.get("kind"),
                success: row.get("success"),
            })
            .collect())
    }

    pub async fn custom_commands(&self) -> Result<Vec<CustomCommand>> {
        let rows = sqlx::query(
            "SELECT pattern, description, response, usage_count, created_at FROM custom_commands ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch custom commands")?;

        Ok(rows
            .into_iter()
            .map(|row| CustomCommand {
                pattern: row.get("pattern"),
                description: row.get("description"),
                response: row.get("response"),
                usage_count: row.get("usage_count"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<LearningStats> {
        let interactions: i64 = sqlx::query("SELECT COUNT(*) AS n FROM interactions")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count interactions")?
            .get("n");
        let commands: i64 = sqlx::query("SELECT COUNT(*) AS n FROM custom_commands")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count custom commands")?
            .get("n");

        Ok(LearningStats {
            total_interactions: interactions,
            custom_commands: commands,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LearningStats {
    pub total_interactions: i64,
    pub custom_commands: i64,
}
