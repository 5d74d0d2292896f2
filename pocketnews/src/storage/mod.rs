//! SQLite persistence for the catalog and its collaborator tables.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

pub mod categories;
pub mod engagement;
pub mod news;
pub mod preferences;
pub mod translations;

/// Ensure the required schema exists. Idempotent and safe to call at startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    tracing::info!("storage: ensuring DB schema (CREATE TABLE IF NOT EXISTS ...)");

    let stmts = [
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            icon_url TEXT,
            display_order INTEGER NOT NULL DEFAULT 0,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS news (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id INTEGER NOT NULL,
            short_headline TEXT NOT NULL,
            short_content TEXT NOT NULL,
            image_url TEXT,
            source_name TEXT,
            source_url TEXT NOT NULL UNIQUE,
            view_count INTEGER NOT NULL DEFAULT 0,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            published_at TIMESTAMP NOT NULL,
            expires_at TIMESTAMP NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            CHECK (expires_at > published_at),
            FOREIGN KEY(category_id) REFERENCES categories(id)
        );
        "#,
        "CREATE INDEX IF NOT EXISTS idx_news_category ON news(category_id);",
        "CREATE INDEX IF NOT EXISTS idx_news_published_at ON news(published_at);",
        "CREATE INDEX IF NOT EXISTS idx_news_expires_at ON news(expires_at);",
        r#"
        CREATE TABLE IF NOT EXISTS device_category_preferences (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL,
            FOREIGN KEY(category_id) REFERENCES categories(id) ON DELETE CASCADE,
            UNIQUE(device_id, category_id)
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS news_translations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            news_id INTEGER NOT NULL,
            language_code TEXT NOT NULL,
            short_headline TEXT NOT NULL,
            short_content TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            FOREIGN KEY(news_id) REFERENCES news(id) ON DELETE CASCADE,
            UNIQUE(news_id, language_code)
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS news_likes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            news_id INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            FOREIGN KEY(news_id) REFERENCES news(id) ON DELETE CASCADE,
            UNIQUE(news_id, device_id)
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS bookmarks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            news_id INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            expires_at TIMESTAMP NOT NULL,
            FOREIGN KEY(news_id) REFERENCES news(id) ON DELETE CASCADE,
            UNIQUE(news_id, device_id)
        );
        "#,
    ];

    for s in &stmts {
        sqlx::query(s)
            .execute(pool)
            .await
            .with_context(|| "failed to ensure schema")?;
    }

    tracing::info!("storage: DB schema ensured");
    Ok(())
}
