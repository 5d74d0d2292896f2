use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::NewsResult;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CachedTranslation {
    pub short_headline: String,
    pub short_content: String,
}

pub async fn find(pool: &SqlitePool, news_id: i64, language: &str) -> NewsResult<Option<CachedTranslation>> {
    let row = sqlx::query_as::<_, CachedTranslation>(
        "SELECT short_headline, short_content FROM news_translations WHERE news_id = ? AND language_code = ?",
    )
    .bind(news_id)
    .bind(language)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Stores a translation; if another writer got there first, returns the stored one.
pub async fn insert_or_get(
    pool: &SqlitePool,
    news_id: i64,
    language: &str,
    translation: &CachedTranslation,
) -> NewsResult<CachedTranslation> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO news_translations (news_id, language_code, short_headline, short_content, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(news_id, language_code) DO NOTHING
        "#,
    )
    .bind(news_id)
    .bind(language)
    .bind(&translation.short_headline)
    .bind(&translation.short_content)
    .bind(Utc::now())
    .execute(pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        return Ok(translation.clone());
    }
    Ok(find(pool, news_id, language)
        .await?
        .unwrap_or_else(|| translation.clone()))
}
