use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::NewsResult;
use crate::models::Category;

/// Preferred category ids for a device; empty means "no preference".
pub async fn category_ids_for_device(pool: &SqlitePool, device_id: &str) -> NewsResult<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT category_id FROM device_category_preferences WHERE device_id = ? ORDER BY category_id",
    )
    .bind(device_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn categories_for_device(pool: &SqlitePool, device_id: &str) -> NewsResult<Vec<Category>> {
    let rows = sqlx::query_as::<_, Category>(
        r#"
        SELECT c.id, c.name, c.slug, c.description, c.icon_url, c.display_order, c.active,
               c.created_at, c.updated_at
        FROM device_category_preferences p
        JOIN categories c ON c.id = p.category_id
        WHERE p.device_id = ?
        ORDER BY c.display_order, c.id
        "#,
    )
    .bind(device_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replaces the device's preference set in one transaction. Ids must already be validated.
pub async fn replace_for_device(pool: &SqlitePool, device_id: &str, category_ids: &[i64]) -> NewsResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM device_category_preferences WHERE device_id = ?")
        .bind(device_id)
        .execute(&mut tx)
        .await?;

    let now = Utc::now();
    for id in category_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO device_category_preferences (device_id, category_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(device_id)
        .bind(id)
        .bind(now)
        .execute(&mut tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
