use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::NewsResult;
use crate::storage::news;

/// Hard-deletes every catalog row whose `expires_at` is strictly before `now`.
/// Translations, likes and bookmarks of those rows go with them.
pub async fn sweep(pool: &SqlitePool, now: DateTime<Utc>) -> NewsResult<u64> {
    let deleted = news::delete_expired_before(pool, now).await?;
    info!(deleted, cutoff = %now, "retention sweep complete");
    Ok(deleted)
}
