//! Feed composition: device-preferred or category-balanced pages of active news.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{NewsError, NewsResult};
use crate::models::{Category, FeedPage, NewsItem};
use crate::storage::news::{self, FeedFilter};
use crate::storage::{categories, preferences};

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct FeedEngine {
    pool: SqlitePool,
}

impl FeedEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// One page of the device's feed. Pages are 0-based. `after` restricts the page to items
    /// published strictly later.
    pub async fn get_feed(
        &self,
        device_id: &str,
        page: u32,
        page_size: u32,
        after: Option<DateTime<Utc>>,
    ) -> NewsResult<FeedPage> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(NewsError::validation(format!(
                "page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let preferred = preferences::category_ids_for_device(&self.pool, device_id).await?;
        let now = Utc::now();

        if !preferred.is_empty() {
            let filter = FeedFilter {
                category_ids: &preferred,
                after,
                now,
            };
            let offset = u64::from(page) * u64::from(page_size);
            let items = news::list_feed(&self.pool, &filter, page_size, offset).await?;
            let total = news::count_feed(&self.pool, &filter).await?;
            debug!(device_id, page, items = items.len(), total, "preferred feed page");
            return Ok(FeedPage::new(items, page, page_size, total));
        }

        self.balanced_page(page, page_size, after, now).await
    }

    /// Takes an equal slice from every active category, in display order.
    async fn balanced_page(
        &self,
        page: u32,
        page_size: u32,
        after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> NewsResult<FeedPage> {
        let cats = categories::list_active(&self.pool).await?;
        if cats.is_empty() {
            return Ok(FeedPage::new(Vec::new(), page, page_size, 0));
        }

        let per_category = (page_size / cats.len() as u32).max(1);
        let offset = u64::from(page) * u64::from(per_category);

        let mut items: Vec<NewsItem> = Vec::with_capacity(page_size as usize);
        for category in &cats {
            let ids = [category.id];
            let filter = FeedFilter {
                category_ids: &ids,
                after,
                now,
            };
            items.extend(news::list_feed(&self.pool, &filter, per_category, offset).await?);
        }
        items.truncate(page_size as usize);

        let all_ids: Vec<i64> = cats.iter().map(|c| c.id).collect();
        let total = news::count_feed(
            &self.pool,
            &FeedFilter {
                category_ids: &all_ids,
                after,
                now,
            },
        )
        .await?;

        debug!(page, per_category, items = items.len(), total, "balanced feed page");
        Ok(FeedPage::new(items, page, page_size, total))
    }

    /// Fetches one active, unexpired item and bumps its view counter in the background.
    pub async fn get_by_id(&self, id: i64) -> NewsResult<NewsItem> {
        let now = Utc::now();
        let item = news::find_by_id(&self.pool, id)
            .await?
            .filter(|item| item.is_readable_at(now))
            .ok_or_else(|| NewsError::not_found(format!("news {}", id)))?;

        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = news::increment_view_count(&pool, id).await {
                warn!(id, "failed to increment view count: {}", e);
            }
        });

        Ok(item)
    }

    pub async fn get_preferences(&self, device_id: &str) -> NewsResult<Vec<Category>> {
        preferences::categories_for_device(&self.pool, device_id).await
    }

    /// Replaces the device's preferred categories. Every id must exist; an empty list clears.
    pub async fn update_preferences(&self, device_id: &str, category_ids: &[i64]) -> NewsResult<Vec<Category>> {
        if device_id.trim().is_empty() {
            return Err(NewsError::validation("device id is required"));
        }

        let mut ids = category_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        for id in &ids {
            if categories::find_by_id(&self.pool, *id).await?.is_none() {
                return Err(NewsError::not_found(format!("category {}", id)));
            }
        }

        preferences::replace_for_device(&self.pool, device_id, &ids).await?;
        self.get_preferences(device_id).await
    }
}
