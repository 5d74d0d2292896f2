use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unenriched item produced by a source client. Never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArticle {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub source_url: String,
    pub source_name: Option<String>,
}

impl RawArticle {
    /// Picks the text handed to enrichment: the body when it is substantial, otherwise the
    /// description, otherwise the title.
    pub fn enrichment_input(&self, min_body_chars: usize) -> &str {
        pick_enrichment_input(
            &self.title,
            self.description.as_deref(),
            self.content.as_deref(),
            min_body_chars,
        )
    }
}

pub(crate) fn pick_enrichment_input<'a>(
    title: &'a str,
    description: Option<&'a str>,
    content: Option<&'a str>,
    min_body_chars: usize,
) -> &'a str {
    match (content, description) {
        (Some(body), _) if body.chars().count() > min_body_chars => body,
        (_, Some(desc)) if !desc.trim().is_empty() => desc,
        (Some(body), None) if !body.trim().is_empty() => body,
        _ => title,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub display_order: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A catalog row joined with its category name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NewsItem {
    pub id: i64,
    pub category_id: i64,
    pub category_name: String,
    pub short_headline: String,
    pub short_content: String,
    pub image_url: Option<String>,
    pub source_name: Option<String>,
    pub source_url: String,
    pub view_count: i64,
    #[serde(skip_serializing)]
    pub active: bool,
    pub published_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub updated_at: DateTime<Utc>,
}

impl NewsItem {
    /// Active and still inside its retention window.
    pub fn is_readable_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at > now
    }
}

/// Values for a catalog insert. `expires_at` is derived from the retention window.
#[derive(Debug, Clone)]
pub struct NewNewsItem {
    pub category_id: i64,
    pub short_headline: String,
    pub short_content: String,
    pub image_url: Option<String>,
    pub source_name: Option<String>,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewNewsItem {
    /// Builds an insert stamped `published_at = now`, `expires_at = now + retention`.
    #[allow(clippy::too_many_arguments)]
    pub fn published_now(
        category_id: i64,
        short_headline: String,
        short_content: String,
        image_url: Option<String>,
        source_name: Option<String>,
        source_url: String,
        now: DateTime<Utc>,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            category_id,
            short_headline,
            short_content,
            image_url,
            source_name,
            source_url,
            published_at: now,
            expires_at: now + retention,
        }
    }
}

/// One page of feed results plus pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<NewsItem>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl FeedPage {
    pub fn new(items: Vec<NewsItem>, page: u32, page_size: u32, total: i64) -> Self {
        let size = i64::from(page_size.max(1));
        Self {
            items,
            page,
            page_size,
            total,
            total_pages: (total + size - 1) / size,
        }
    }
}
