use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::NewsResult;
use crate::models::{NewNewsItem, NewsItem};

const NEWS_SELECT: &str = r#"
    SELECT n.id, n.category_id, c.name AS category_name, n.short_headline, n.short_content,
           n.image_url, n.source_name, n.source_url, n.view_count, n.active,
           n.published_at, n.expires_at, n.created_at, n.updated_at
    FROM news n
    JOIN categories c ON c.id = n.category_id
"#;

/// True if any row (active or not) already carries this source URL.
pub async fn exists_by_source_url(pool: &SqlitePool, source_url: &str) -> NewsResult<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT id FROM news WHERE source_url = ?")
        .bind(source_url)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Inserts a catalog row gated by the source-URL unique index.
/// Returns `None` when a row with the same URL already exists.
pub async fn insert_if_absent(pool: &SqlitePool, item: &NewNewsItem) -> NewsResult<Option<i64>> {
    let now = Utc::now();
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO news (category_id, short_headline, short_content, image_url, source_name,
                          source_url, view_count, active, published_at, expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, 1, ?, ?, ?, ?)
        ON CONFLICT(source_url) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(item.category_id)
    .bind(&item.short_headline)
    .bind(&item.short_content)
    .bind(&item.image_url)
    .bind(&item.source_name)
    .bind(&item.source_url)
    .bind(item.published_at)
    .bind(item.expires_at)
    .bind(now)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> NewsResult<Option<NewsItem>> {
    let row = sqlx::query_as::<_, NewsItem>(&format!("{} WHERE n.id = ?", NEWS_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_source_url(pool: &SqlitePool, source_url: &str) -> NewsResult<Option<NewsItem>> {
    let row = sqlx::query_as::<_, NewsItem>(&format!("{} WHERE n.source_url = ?", NEWS_SELECT))
        .bind(source_url)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Single-statement increment; concurrent increments may race, which is tolerated.
pub async fn increment_view_count(pool: &SqlitePool, id: i64) -> NewsResult<()> {
    sqlx::query("UPDATE news SET view_count = view_count + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Short headlines of the most recently published active rows, newest first.
pub async fn recent_headlines(pool: &SqlitePool, limit: usize) -> NewsResult<Vec<String>> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT short_headline FROM news WHERE active = 1 ORDER BY published_at DESC, id DESC LIMIT ?",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Hard-deletes every row whose expiry is strictly before `now`.
pub async fn delete_expired_before(pool: &SqlitePool, now: DateTime<Utc>) -> NewsResult<u64> {
    let res = sqlx::query("DELETE FROM news WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Filter shared by the feed listing and count queries.
#[derive(Debug, Clone, Copy)]
pub struct FeedFilter<'a> {
    pub category_ids: &'a [i64],
    pub after: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

fn push_feed_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &FeedFilter<'_>) {
    qb.push(" WHERE n.active = 1 AND n.expires_at > ");
    qb.push_bind(filter.now);
    qb.push(" AND n.category_id IN (");
    let mut ids = qb.separated(", ");
    for id in filter.category_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(")");
    if let Some(after) = filter.after {
        qb.push(" AND n.published_at > ");
        qb.push_bind(after);
    }
}

/// Active, unexpired rows in the given categories, newest first.
pub async fn list_feed(
    pool: &SqlitePool,
    filter: &FeedFilter<'_>,
    limit: u32,
    offset: u64,
) -> NewsResult<Vec<NewsItem>> {
    let mut qb = QueryBuilder::<Sqlite>::new(NEWS_SELECT);
    push_feed_filter(&mut qb, filter);
    qb.push(" ORDER BY n.published_at DESC, n.id DESC LIMIT ");
    qb.push_bind(i64::from(limit));
    qb.push(" OFFSET ");
    qb.push_bind(offset as i64);

    let rows = qb.build_query_as::<NewsItem>().fetch_all(pool).await?;
    Ok(rows)
}

pub async fn count_feed(pool: &SqlitePool, filter: &FeedFilter<'_>) -> NewsResult<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM news n");
    push_feed_filter(&mut qb, filter);
    let (count,) = qb.build_query_as::<(i64,)>().fetch_one(pool).await?;
    Ok(count)
}
