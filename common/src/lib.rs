/*!
common/src/lib.rs

Shared configuration types and DB helper functions for PocketNews.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader that merges a default config file with an override file
- A helper to initialize an SQLite connection pool
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/pocketnews.db")
    pub path: String,
}

/// Scheduler configuration: hourly-ish ingestion and a daily retention sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub ingest_interval_minutes: Option<u64>,
    /// Wall-clock time in "HH:MM" 24h format (UTC) for the retention sweep
    pub retention_time: Option<String>,
    pub run_on_startup: Option<bool>,
}

impl SchedulerConfig {
    pub fn ingest_interval_minutes(&self) -> u64 {
        self.ingest_interval_minutes.unwrap_or(60).max(1)
    }

    pub fn retention_time(&self) -> &str {
        self.retention_time.as_deref().unwrap_or("00:00")
    }

    pub fn run_on_startup(&self) -> bool {
        self.run_on_startup.unwrap_or(true)
    }
}

/// Politeness / fetching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolitenessConfig {
    pub fetch_timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
}

impl PolitenessConfig {
    pub fn fetch_timeout_seconds(&self) -> u64 {
        self.fetch_timeout_seconds.unwrap_or(10)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("PocketNews/0.1.0")
    }
}

/// Remote LLM config (used if `llm.adapter = "remote"`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    /// Value sent in the `anthropic-version` header
    pub api_version: Option<String>,
}

/// LLM top-level config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    pub remote: Option<RemoteLlmConfig>,
}

/// One row of the external-category → internal-slug table for the headline API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// Category name understood by the headline API (e.g. "general")
    pub external: String,
    /// Internal category slug (e.g. "top-stories")
    pub slug: String,
}

/// Headline API source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlinesConfig {
    pub base_url: String,
    pub api_key_env: Option<String>,
    pub country: Option<String>,
    pub page_size: Option<u32>,
    #[serde(default)]
    pub categories: Vec<CategoryMapping>,
}

/// Syndication feed descriptor: a feed URL plus the category its items default to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    pub url: String,
    pub category: String,
    pub source_name: Option<String>,
}

/// Ingestion tuning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub retention_hours: Option<i64>,
    pub default_category: Option<String>,
    pub near_duplicate_detection: Option<bool>,
    pub recent_window: Option<usize>,
    pub min_body_chars: Option<usize>,
}

impl IngestionConfig {
    pub fn retention_hours(&self) -> i64 {
        self.retention_hours.unwrap_or(48).max(1)
    }

    pub fn default_category(&self) -> &str {
        self.default_category.as_deref().unwrap_or("top-stories")
    }

    pub fn near_duplicate_detection(&self) -> bool {
        self.near_duplicate_detection.unwrap_or(true)
    }

    pub fn recent_window(&self) -> usize {
        self.recent_window.unwrap_or(50)
    }

    pub fn min_body_chars(&self) -> usize {
        self.min_body_chars.unwrap_or(100)
    }
}

/// Translation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub api_url: String,
    pub base_language: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Bookmark / like settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngagementConfig {
    pub bookmark_expiry_days: Option<i64>,
}

/// Seed category, inserted at startup if its slug is missing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub display_order: Option<i64>,
}

/// HTTP bind settings, merged into the Rocket figment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub politeness: Option<PolitenessConfig>,
    pub llm: Option<LlmConfig>,
    pub headlines: Option<HeadlinesConfig>,
    #[serde(default)]
    pub feeds: Vec<FeedSourceConfig>,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    pub translation: Option<TranslationConfig>,
    #[serde(default)]
    pub engagement: EngagementConfig,
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    pub server: Option<ServerConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    pub fn politeness(&self) -> PolitenessConfig {
        self.politeness.clone().unwrap_or_default()
    }

    pub fn bookmark_expiry_days(&self) -> i64 {
        self.engagement.bookmark_expiry_days.unwrap_or(7).max(1)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory if necessary and returns a configured `SqlitePool` in WAL
/// mode. Foreign keys are enforced so dependent rows follow catalog deletions.
///
/// Example:
///   let pool = init_db_pool("data/pocketnews.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_from_string_and_db_pool() {
        let toml = r#"
            [database]
            path = "data/test.db"

            [scheduler]
            ingest_interval_minutes = 30

            [[feeds]]
            url = "https://example.com/rss"
            category = "world"

            [[categories]]
            name = "World"
            slug = "world"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.scheduler.ingest_interval_minutes(), 30);
        assert_eq!(cfg.scheduler.retention_time(), "00:00");
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.feeds[0].category, "world");
        assert_eq!(cfg.ingestion.retention_hours(), 48);
        assert_eq!(cfg.ingestion.default_category(), "top-stories");
        assert_eq!(cfg.categories[0].slug, "world");

        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("pocketnews.db");
        let pool = init_db_pool(&db_path.to_string_lossy()).await.expect("init pool");
        let conn = pool.acquire().await.expect("acquire conn");
        drop(conn);
    }

    #[tokio::test]
    async fn override_file_wins_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");

        tokio::fs::write(
            &default_path,
            r#"
            [database]
            path = "data/default.db"

            [ingestion]
            retention_hours = 48
            default_category = "top-stories"
            "#,
        )
        .await
        .expect("write default");
        tokio::fs::write(
            &override_path,
            r#"
            [ingestion]
            retention_hours = 24
            "#,
        )
        .await
        .expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load merged config");
        assert_eq!(cfg.database.path, "data/default.db");
        assert_eq!(cfg.ingestion.retention_hours(), 24);
        assert_eq!(cfg.ingestion.default_category(), "top-stories");
    }
}
