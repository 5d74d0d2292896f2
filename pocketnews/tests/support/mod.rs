#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use common::CategorySeed;
use pocketnews::models::{Category, NewNewsItem};
use pocketnews::storage::{self, categories, news};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

// Helper to create a private in-memory database with the real schema
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory options")
        .foreign_keys(true);
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("connect memory db");
    storage::ensure_schema(&pool).await.expect("ensure schema");
    pool
}

pub fn seed(name: &str, slug: &str, order: i64) -> CategorySeed {
    CategorySeed {
        name: name.to_string(),
        slug: slug.to_string(),
        description: None,
        icon_url: None,
        display_order: Some(order),
    }
}

pub async fn add_category(pool: &SqlitePool, name: &str, slug: &str, order: i64) -> Category {
    categories::insert_if_missing(pool, &seed(name, slug, order))
        .await
        .expect("insert category")
}

/// Inserts an active row published at `published_at` that expires 48h later.
pub async fn add_news(pool: &SqlitePool, category_id: i64, url: &str, published_at: DateTime<Utc>) -> i64 {
    add_news_expiring(pool, category_id, url, published_at, published_at + Duration::hours(48)).await
}

pub async fn add_news_expiring(
    pool: &SqlitePool,
    category_id: i64,
    url: &str,
    published_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> i64 {
    let item = NewNewsItem {
        category_id,
        short_headline: format!("Headline for {}", url),
        short_content: format!("Summary for {}", url),
        image_url: None,
        source_name: Some("Test Wire".to_string()),
        source_url: url.to_string(),
        published_at,
        expires_at,
    };
    news::insert_if_absent(pool, &item)
        .await
        .expect("insert news")
        .expect("new row")
}

pub async fn news_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news")
        .fetch_one(pool)
        .await
        .expect("count news")
}

pub async fn deactivate(pool: &SqlitePool, id: i64) {
    sqlx::query("UPDATE news SET active = 0 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .expect("deactivate news");
}
