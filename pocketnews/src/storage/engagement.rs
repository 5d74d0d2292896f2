// Likes and bookmarks keyed by (news, device). Writes are insert-or-ignore so repeated
// or racing toggles converge on one row.
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::NewsResult;
use crate::models::NewsItem;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Bookmark {
    pub news_id: i64,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn insert_like(pool: &SqlitePool, news_id: i64, device_id: &str) -> NewsResult<bool> {
    let res = sqlx::query(
        "INSERT INTO news_likes (news_id, device_id, created_at) VALUES (?, ?, ?) ON CONFLICT(news_id, device_id) DO NOTHING",
    )
    .bind(news_id)
    .bind(device_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn delete_like(pool: &SqlitePool, news_id: i64, device_id: &str) -> NewsResult<bool> {
    let res = sqlx::query("DELETE FROM news_likes WHERE news_id = ? AND device_id = ?")
        .bind(news_id)
        .bind(device_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn has_liked(pool: &SqlitePool, news_id: i64, device_id: &str) -> NewsResult<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT id FROM news_likes WHERE news_id = ? AND device_id = ?")
        .bind(news_id)
        .bind(device_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn like_count(pool: &SqlitePool, news_id: i64) -> NewsResult<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM news_likes WHERE news_id = ?")
        .bind(news_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn find_active_bookmark(
    pool: &SqlitePool,
    news_id: i64,
    device_id: &str,
    now: DateTime<Utc>,
) -> NewsResult<Option<Bookmark>> {
    let row = sqlx::query_as::<_, Bookmark>(
        r#"
        SELECT news_id, device_id, created_at, expires_at FROM bookmarks
        WHERE news_id = ? AND device_id = ? AND expires_at > ?
        "#,
    )
    .bind(news_id)
    .bind(device_id)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Removes a lapsed bookmark for the pair so a fresh one can be inserted.
pub async fn delete_lapsed_bookmark(
    pool: &SqlitePool,
    news_id: i64,
    device_id: &str,
    now: DateTime<Utc>,
) -> NewsResult<()> {
    sqlx::query("DELETE FROM bookmarks WHERE news_id = ? AND device_id = ? AND expires_at <= ?")
        .bind(news_id)
        .bind(device_id)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_bookmark_if_absent(pool: &SqlitePool, bookmark: &Bookmark) -> NewsResult<bool> {
    let res = sqlx::query(
        r#"
        INSERT INTO bookmarks (news_id, device_id, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(news_id, device_id) DO NOTHING
        "#,
    )
    .bind(bookmark.news_id)
    .bind(&bookmark.device_id)
    .bind(bookmark.created_at)
    .bind(bookmark.expires_at)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn delete_bookmark(pool: &SqlitePool, news_id: i64, device_id: &str) -> NewsResult<bool> {
    let res = sqlx::query("DELETE FROM bookmarks WHERE news_id = ? AND device_id = ?")
        .bind(news_id)
        .bind(device_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Active news rows bookmarked by the device, most recently bookmarked first.
pub async fn list_bookmarked_news(
    pool: &SqlitePool,
    device_id: &str,
    now: DateTime<Utc>,
    limit: u32,
    offset: u64,
) -> NewsResult<Vec<NewsItem>> {
    let rows = sqlx::query_as::<_, NewsItem>(
        r#"
        SELECT n.id, n.category_id, c.name AS category_name, n.short_headline, n.short_content,
               n.image_url, n.source_name, n.source_url, n.view_count, n.active,
               n.published_at, n.expires_at, n.created_at, n.updated_at
        FROM bookmarks b
        JOIN news n ON n.id = b.news_id
        JOIN categories c ON c.id = n.category_id
        WHERE b.device_id = ? AND b.expires_at > ? AND n.active = 1 AND n.expires_at > ?
        ORDER BY b.created_at DESC, b.id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(device_id)
    .bind(now)
    .bind(now)
    .bind(i64::from(limit))
    .bind(offset as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_bookmarked_news(pool: &SqlitePool, device_id: &str, now: DateTime<Utc>) -> NewsResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM bookmarks b
        JOIN news n ON n.id = b.news_id
        WHERE b.device_id = ? AND b.expires_at > ? AND n.active = 1 AND n.expires_at > ?
        "#,
    )
    .bind(device_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
