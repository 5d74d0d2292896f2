use chrono::Utc;
use common::CategorySeed;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::NewsResult;
use crate::models::Category;

const CATEGORY_COLUMNS: &str =
    "id, name, slug, description, icon_url, display_order, active, created_at, updated_at";

pub async fn list_active(pool: &SqlitePool) -> NewsResult<Vec<Category>> {
    let rows = sqlx::query_as::<_, Category>(&format!(
        "SELECT {} FROM categories WHERE active = 1 ORDER BY display_order, id",
        CATEGORY_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> NewsResult<Option<Category>> {
    let row = sqlx::query_as::<_, Category>(&format!(
        "SELECT {} FROM categories WHERE slug = ?",
        CATEGORY_COLUMNS
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> NewsResult<Option<Category>> {
    let row = sqlx::query_as::<_, Category>(&format!(
        "SELECT {} FROM categories WHERE id = ?",
        CATEGORY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Inserts a category unless one with the same slug or name exists; returns the stored row.
pub async fn insert_if_missing(pool: &SqlitePool, seed: &CategorySeed) -> NewsResult<Category> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO categories (name, slug, description, icon_url, display_order, active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 1, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(&seed.name)
    .bind(&seed.slug)
    .bind(&seed.description)
    .bind(&seed.icon_url)
    .bind(seed.display_order.unwrap_or(0))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, Category>(&format!(
        "SELECT {} FROM categories WHERE slug = ? OR name = ?",
        CATEGORY_COLUMNS
    ))
    .bind(&seed.slug)
    .bind(&seed.name)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Ensure the categories defined in configuration are present. Safe to call repeatedly.
pub async fn sync_seeds(pool: &SqlitePool, seeds: &[CategorySeed]) -> NewsResult<usize> {
    for seed in seeds {
        insert_if_missing(pool, seed).await?;
    }
    info!(count = seeds.len(), "configured categories synchronized");
    Ok(seeds.len())
}
