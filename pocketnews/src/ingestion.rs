// Ingestion orchestrator: fetch -> dedup -> enrich -> resolve category -> persist
use anyhow::{Context, Result};
use chrono::Utc;
use common::{CategoryMapping, Config, FeedSourceConfig, IngestionConfig};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{NewsError, NewsResult};
use crate::llm::enrichment::{Enricher, Enrichment};
use crate::models::{Category, NewNewsItem, RawArticle};
use crate::sources::headlines::HeadlinesClient;
use crate::sources::rss::FeedClient;
use crate::sources::http_client;
use crate::storage::{categories, news};

/// Per-source counters reported at the end of a run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    pub saved: usize,
    pub skipped_existing: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
}

impl SourceReport {
    fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Saved => self.saved += 1,
            ItemOutcome::Existing => self.skipped_existing += 1,
            ItemOutcome::NearDuplicate => self.skipped_duplicate += 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn saved(&self) -> usize {
        self.sources.iter().map(|s| s.saved).sum()
    }

    pub fn failed(&self) -> usize {
        self.sources.iter().map(|s| s.failed).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Saved,
    Existing,
    NearDuplicate,
}

/// Bounded working set of headlines seen during one run, oldest evicted first.
#[derive(Debug, Default)]
pub struct RecentHeadlines {
    items: VecDeque<String>,
    capacity: usize,
}

impl RecentHeadlines {
    /// `newest_first` is the order storage returns them in.
    pub fn seeded(newest_first: Vec<String>, capacity: usize) -> Self {
        let mut set = Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        };
        for headline in newest_first.into_iter().rev() {
            set.push(headline);
        }
        set
    }

    pub fn push(&mut self, headline: String) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(headline);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&mut self) -> &[String] {
        self.items.make_contiguous()
    }
}

/// Drives both ingestion paths. Runs never overlap: a second caller while a run is in
/// progress gets `None` back instead of waiting.
pub struct Ingestor {
    pool: SqlitePool,
    enricher: Enricher,
    feed_client: FeedClient,
    feed_sources: Vec<FeedSourceConfig>,
    headlines: Option<(HeadlinesClient, Vec<CategoryMapping>)>,
    settings: IngestionConfig,
    run_lock: Mutex<()>,
}

impl Ingestor {
    pub fn new(pool: SqlitePool, enricher: Enricher, feed_client: FeedClient, settings: IngestionConfig) -> Self {
        Self {
            pool,
            enricher,
            feed_client,
            feed_sources: Vec::new(),
            headlines: None,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_feeds(mut self, sources: Vec<FeedSourceConfig>) -> Self {
        self.feed_sources = sources;
        self
    }

    pub fn with_headlines(mut self, client: HeadlinesClient, mapping: Vec<CategoryMapping>) -> Self {
        self.headlines = Some((client, mapping));
        self
    }

    /// Wires sources from configuration. A headline section whose API key variable is unset
    /// is logged and left out.
    pub fn from_config(pool: SqlitePool, config: &Config, enricher: Enricher) -> Result<Self> {
        let politeness = config.politeness();
        let client = http_client(politeness.fetch_timeout_seconds(), politeness.user_agent())
            .context("failed to build source HTTP client")?;

        let mut ingestor = Ingestor::new(pool, enricher, FeedClient::new(client.clone()), config.ingestion.clone())
            .with_feeds(config.feeds.clone());

        if let Some(ref headlines) = config.headlines {
            let key = headlines
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|k| !k.trim().is_empty());
            match key {
                Some(key) => {
                    let hc = HeadlinesClient::new(client, &headlines.base_url, key).with_query_defaults(
                        headlines.country.clone().unwrap_or_else(|| "in".to_string()),
                        headlines.page_size.unwrap_or(20),
                    );
                    ingestor = ingestor.with_headlines(hc, headlines.categories.clone());
                }
                None => warn!(
                    env = headlines.api_key_env.as_deref().unwrap_or("<unset>"),
                    "headline API key not available, headline source disabled"
                ),
            }
        }

        Ok(ingestor)
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// One full run over every configured source. `None` if another run holds the lock.
    pub async fn run_all(&self) -> Option<RunReport> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("ingestion run already in progress, skipping");
                return None;
            }
        };

        let started = std::time::Instant::now();
        let mut report = RunReport::default();
        report.sources.extend(self.headlines_pass().await);
        report.sources.extend(self.feeds_pass().await);

        info!(
            saved = report.saved(),
            failed = report.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingestion run complete"
        );
        Some(report)
    }

    /// Headline-API path: one request per mapped external category.
    async fn headlines_pass(&self) -> Vec<SourceReport> {
        let Some((client, mapping)) = self.headlines.as_ref() else {
            return Vec::new();
        };

        let mut reports = Vec::with_capacity(mapping.len());
        for entry in mapping {
            let mut report = SourceReport::new(format!("headlines:{}", entry.external));
            let items = client.fetch_top_headlines(&entry.external).await;
            report.fetched = items.len();

            for raw in &items {
                match self.ingest_headline(raw, &entry.slug).await {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => {
                        error!(title = %raw.title, "Error processing article: {}", e);
                        report.failed += 1;
                    }
                }
            }
            log_report(&report);
            reports.push(report);
        }
        reports
    }

    async fn feeds_pass(&self) -> Vec<SourceReport> {
        if self.feed_sources.is_empty() {
            return Vec::new();
        }

        let detect = self.settings.near_duplicate_detection();
        let mut recent = match news::recent_headlines(&self.pool, self.settings.recent_window()).await {
            Ok(seed) => RecentHeadlines::seeded(seed, self.settings.recent_window()),
            Err(e) => {
                warn!("failed to seed recent headlines: {}", e);
                RecentHeadlines::seeded(Vec::new(), self.settings.recent_window())
            }
        };
        let slugs: Vec<String> = match categories::list_active(&self.pool).await {
            Ok(cats) => cats.into_iter().map(|c| c.slug).collect(),
            Err(e) => {
                warn!("failed to load category slugs for classification: {}", e);
                Vec::new()
            }
        };
        debug!(recent = recent.len(), categories = slugs.len(), "feed pass starting");

        let mut reports = Vec::with_capacity(self.feed_sources.len());
        for source in &self.feed_sources {
            let mut report = SourceReport::new(source.url.clone());
            let items = self.feed_client.fetch(source).await;
            report.fetched = items.len();

            for raw in &items {
                let result = self
                    .ingest_feed_item(raw, source, detect, &slugs, &mut recent)
                    .await;
                match result {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => {
                        error!(title = %raw.title, "Error processing feed item: {}", e);
                        report.failed += 1;
                    }
                }
            }
            log_report(&report);
            reports.push(report);
        }
        reports
    }

    async fn ingest_headline(&self, raw: &RawArticle, slug: &str) -> NewsResult<ItemOutcome> {
        if news::exists_by_source_url(&self.pool, &raw.source_url).await? {
            debug!(url = %raw.source_url, "already stored, skipping");
            return Ok(ItemOutcome::Existing);
        }

        let input = raw.enrichment_input(self.settings.min_body_chars());
        let enrichment = self.enricher.enrich(&raw.title, Some(input)).await;
        let category = self.resolve_category(slug).await?;
        self.persist(raw, &category, enrichment).await
    }

    async fn ingest_feed_item(
        &self,
        raw: &RawArticle,
        source: &FeedSourceConfig,
        detect_duplicates: bool,
        slugs: &[String],
        recent: &mut RecentHeadlines,
    ) -> NewsResult<ItemOutcome> {
        if news::exists_by_source_url(&self.pool, &raw.source_url).await? {
            debug!(url = %raw.source_url, "already stored, skipping");
            return Ok(ItemOutcome::Existing);
        }

        let input = raw.enrichment_input(self.settings.min_body_chars());
        let (enrichment, slug) = if detect_duplicates {
            let classified = self
                .enricher
                .enrich_and_classify(&raw.title, Some(input), slugs, recent.as_slice(), &source.category)
                .await;
            if classified.is_duplicate {
                debug!(title = %raw.title, "near-duplicate of a recent headline, skipping");
                return Ok(ItemOutcome::NearDuplicate);
            }
            (classified.enrichment, classified.category_slug)
        } else {
            (self.enricher.enrich(&raw.title, Some(input)).await, source.category.clone())
        };

        let category = self.resolve_category(&slug).await?;
        let headline = enrichment.short_headline.clone();
        let outcome = self.persist(raw, &category, enrichment).await?;
        if outcome == ItemOutcome::Saved {
            recent.push(headline);
        }
        Ok(outcome)
    }

    /// Slug first, then the catalog-wide default category.
    async fn resolve_category(&self, slug: &str) -> NewsResult<Category> {
        if let Some(category) = categories::find_by_slug(&self.pool, slug).await? {
            return Ok(category);
        }
        let default_slug = self.settings.default_category();
        warn!(slug, default = default_slug, "category not found, using default");
        categories::find_by_slug(&self.pool, default_slug)
            .await?
            .ok_or_else(|| NewsError::not_found(format!("category '{}' and default category '{}'", slug, default_slug)))
    }

    async fn persist(&self, raw: &RawArticle, category: &Category, enrichment: Enrichment) -> NewsResult<ItemOutcome> {
        let item = NewNewsItem::published_now(
            category.id,
            enrichment.short_headline,
            enrichment.short_content,
            raw.image_url.clone(),
            raw.source_name.clone(),
            raw.source_url.clone(),
            Utc::now(),
            chrono::Duration::hours(self.settings.retention_hours()),
        );

        match news::insert_if_absent(&self.pool, &item).await? {
            Some(id) => {
                debug!(id, title = %item.short_headline, category = %category.slug, "saved news item");
                Ok(ItemOutcome::Saved)
            }
            None => {
                debug!(url = %item.source_url, "lost insert race, treating as existing");
                Ok(ItemOutcome::Existing)
            }
        }
    }
}

fn log_report(report: &SourceReport) {
    info!(
        source = %report.source,
        fetched = report.fetched,
        saved = report.saved,
        skipped_existing = report.skipped_existing,
        skipped_duplicate = report.skipped_duplicate,
        failed = report.failed,
        "source ingested"
    );
}
