// Explicit create path for catalog rows; shares enrichment and retention with ingestion
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{NewsError, NewsResult};
use crate::llm::enrichment::Enricher;
use crate::models::{pick_enrichment_input, NewNewsItem, NewsItem};
use crate::storage::{categories, news};

/// Body of `POST /api/v1/news`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsCreateRequest {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub category_id: i64,
    pub image_url: Option<String>,
    pub source_name: Option<String>,
    pub source_url: String,
}

#[derive(Clone)]
pub struct NewsService {
    pool: SqlitePool,
    enricher: Enricher,
    retention: chrono::Duration,
    min_body_chars: usize,
}

impl NewsService {
    pub fn new(pool: SqlitePool, enricher: Enricher, retention: chrono::Duration, min_body_chars: usize) -> Self {
        Self {
            pool,
            enricher,
            retention,
            min_body_chars,
        }
    }

    /// Validates, enriches and stores one article. A source URL that is already stored
    /// yields the existing row.
    pub async fn create(&self, req: NewsCreateRequest) -> NewsResult<NewsItem> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(NewsError::validation("title is required"));
        }
        let source_url = validate_source_url(&req.source_url)?;

        let category = categories::find_by_id(&self.pool, req.category_id)
            .await?
            .ok_or_else(|| NewsError::not_found(format!("category {}", req.category_id)))?;

        if let Some(existing) = news::find_by_source_url(&self.pool, &source_url).await? {
            return Ok(existing);
        }

        let input = pick_enrichment_input(
            title,
            req.description.as_deref(),
            req.content.as_deref(),
            self.min_body_chars,
        );
        let enrichment = self.enricher.enrich(title, Some(input)).await;

        let item = NewNewsItem::published_now(
            category.id,
            enrichment.short_headline,
            enrichment.short_content,
            req.image_url.filter(|u| !u.trim().is_empty()),
            req.source_name.filter(|s| !s.trim().is_empty()),
            source_url.clone(),
            Utc::now(),
            self.retention,
        );

        let id = match news::insert_if_absent(&self.pool, &item).await? {
            Some(id) => {
                info!(id, category = %category.slug, "news item created");
                id
            }
            None => {
                let existing = news::find_by_source_url(&self.pool, &source_url)
                    .await?
                    .ok_or_else(|| NewsError::Conflict(format!("source url {}", source_url)))?;
                return Ok(existing);
            }
        };

        news::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| NewsError::not_found(format!("news {}", id)))
    }
}

/// Absolute http(s) URL, trimmed.
fn validate_source_url(raw: &str) -> NewsResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NewsError::validation("source url is required"));
    }
    let parsed = url::Url::parse(trimmed).map_err(|e| NewsError::validation(format!("invalid source url: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(trimmed.to_string()),
        _ => Err(NewsError::validation("source url must be an absolute http(s) url")),
    }
}
