use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{NewsError, NewsResult};
use crate::models::FeedPage;
use crate::storage::engagement::{self as store, Bookmark};
use crate::storage::news;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LikeStatus {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookmarkStatus {
    pub bookmarked: bool,
    pub bookmark: Option<Bookmark>,
}

/// Likes and bookmarks. Every mutation is idempotent per (news, device).
#[derive(Clone)]
pub struct EngagementService {
    pool: SqlitePool,
    bookmark_ttl: chrono::Duration,
}

impl EngagementService {
    pub fn new(pool: SqlitePool, bookmark_expiry_days: i64) -> Self {
        Self {
            pool,
            bookmark_ttl: chrono::Duration::days(bookmark_expiry_days),
        }
    }

    async fn require_news(&self, news_id: i64, device_id: &str) -> NewsResult<()> {
        if device_id.trim().is_empty() {
            return Err(NewsError::validation("device id is required"));
        }
        match news::find_by_id(&self.pool, news_id).await? {
            Some(item) if item.is_readable_at(Utc::now()) => Ok(()),
            _ => Err(NewsError::not_found(format!("news {}", news_id))),
        }
    }

    pub async fn like(&self, news_id: i64, device_id: &str) -> NewsResult<LikeStatus> {
        self.require_news(news_id, device_id).await?;
        if !store::insert_like(&self.pool, news_id, device_id).await? {
            debug!(news_id, device_id, "already liked");
        }
        self.like_status(news_id, device_id).await
    }

    pub async fn unlike(&self, news_id: i64, device_id: &str) -> NewsResult<LikeStatus> {
        self.require_news(news_id, device_id).await?;
        store::delete_like(&self.pool, news_id, device_id).await?;
        self.like_status(news_id, device_id).await
    }

    pub async fn like_status(&self, news_id: i64, device_id: &str) -> NewsResult<LikeStatus> {
        Ok(LikeStatus {
            liked: store::has_liked(&self.pool, news_id, device_id).await?,
            like_count: store::like_count(&self.pool, news_id).await?,
        })
    }

    /// Returns the live bookmark for the pair, creating one if needed.
    pub async fn add_bookmark(&self, news_id: i64, device_id: &str) -> NewsResult<Bookmark> {
        self.require_news(news_id, device_id).await?;
        let now = Utc::now();

        if let Some(existing) = store::find_active_bookmark(&self.pool, news_id, device_id, now).await? {
            return Ok(existing);
        }

        store::delete_lapsed_bookmark(&self.pool, news_id, device_id, now).await?;
        let fresh = Bookmark {
            news_id,
            device_id: device_id.to_string(),
            created_at: now,
            expires_at: now + self.bookmark_ttl,
        };
        if store::insert_bookmark_if_absent(&self.pool, &fresh).await? {
            return Ok(fresh);
        }

        // A concurrent request inserted first; hand back its row.
        store::find_active_bookmark(&self.pool, news_id, device_id, now)
            .await?
            .ok_or_else(|| NewsError::Conflict(format!("bookmark for news {}", news_id)))
    }

    pub async fn remove_bookmark(&self, news_id: i64, device_id: &str) -> NewsResult<BookmarkStatus> {
        if device_id.trim().is_empty() {
            return Err(NewsError::validation("device id is required"));
        }
        store::delete_bookmark(&self.pool, news_id, device_id).await?;
        Ok(BookmarkStatus {
            bookmarked: false,
            bookmark: None,
        })
    }

    pub async fn bookmark_status(&self, news_id: i64, device_id: &str) -> NewsResult<BookmarkStatus> {
        let bookmark = store::find_active_bookmark(&self.pool, news_id, device_id, Utc::now()).await?;
        Ok(BookmarkStatus {
            bookmarked: bookmark.is_some(),
            bookmark,
        })
    }

    pub async fn list_bookmarks(&self, device_id: &str, page: u32, page_size: u32) -> NewsResult<FeedPage> {
        if page_size == 0 || page_size > crate::feed::MAX_PAGE_SIZE {
            return Err(NewsError::validation("invalid page size"));
        }
        let now = Utc::now();
        let offset = u64::from(page) * u64::from(page_size);
        let items = store::list_bookmarked_news(&self.pool, device_id, now, page_size, offset).await?;
        let total = store::count_bookmarked_news(&self.pool, device_id, now).await?;
        Ok(FeedPage::new(items, page, page_size, total))
    }
}
