use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use common::{Config, ServerConfig};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, routes, Build, Rocket, State};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::catalog::{NewsCreateRequest, NewsService};
use crate::engagement::{BookmarkStatus, EngagementService, LikeStatus};
use crate::error::NewsError;
use crate::feed::FeedEngine;
use crate::ingestion::Ingestor;
use crate::llm::enrichment::Enricher;
use crate::models::{Category, FeedPage, NewsItem};
use crate::sources::http_client;
use crate::storage::{categories, engagement::Bookmark};
use crate::translation::{Localizer, Translator};

const DEFAULT_PAGE_SIZE: u32 = 20;

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub db: SqlitePool,
    pub feed: FeedEngine,
    pub news: NewsService,
    pub engagement: EngagementService,
    pub localizer: Localizer,
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    pub fn from_config(db: SqlitePool, config: &Config, enricher: Enricher, ingestor: Arc<Ingestor>) -> Result<Self> {
        let translator = match config.translation {
            Some(ref t) => {
                let client = http_client(t.timeout_seconds.unwrap_or(10), config.politeness().user_agent())
                    .context("failed to build translation HTTP client")?;
                Some(Translator::from_config(client, t))
            }
            None => None,
        };

        Ok(AppState {
            started_at: Utc::now(),
            feed: FeedEngine::new(db.clone()),
            news: NewsService::new(
                db.clone(),
                enricher,
                chrono::Duration::hours(config.ingestion.retention_hours()),
                config.ingestion.min_body_chars(),
            ),
            engagement: EngagementService::new(db.clone(), config.bookmark_expiry_days()),
            localizer: Localizer::new(db.clone(), translator),
            ingestor,
            db,
        })
    }
}

type ApiResult<T> = std::result::Result<Json<T>, Status>;

fn reject(e: NewsError) -> Status {
    match e {
        NewsError::NotFound(_) => Status::NotFound,
        NewsError::Validation(ref msg) => {
            tracing::debug!("rejected request: {}", msg);
            Status::BadRequest
        }
        NewsError::Conflict(_) => Status::Conflict,
        other => {
            tracing::error!("request failed: {}", other);
            Status::InternalServerError
        }
    }
}

fn require_device(device_id: Option<String>) -> std::result::Result<String, Status> {
    device_id
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or(Status::BadRequest)
}

fn parse_after(after: Option<String>) -> std::result::Result<Option<DateTime<Utc>>, Status> {
    after
        .filter(|a| !a.trim().is_empty())
        .map(|a| {
            DateTime::parse_from_rfc3339(&restore_offset_sign(a.trim()))
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| Status::BadRequest)
        })
        .transpose()
}

/// An unencoded `+hh:mm` offset arrives form-decoded as ` hh:mm`.
fn restore_offset_sign(value: &str) -> String {
    match value.char_indices().rev().nth(5) {
        Some((i, ' ')) => format!("{}+{}", &value[..i], &value[i + 1..]),
        _ => value.to_string(),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: i64,
}

#[get("/health")]
async fn health(state: &State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    })
}

#[get("/api/v1/feed?<device_id>&<page>&<size>&<after>&<lang>")]
async fn get_feed(
    state: &State<AppState>,
    device_id: Option<String>,
    page: Option<u32>,
    size: Option<u32>,
    after: Option<String>,
    lang: Option<String>,
) -> ApiResult<FeedPage> {
    let after = parse_after(after)?;
    let device_id = device_id.unwrap_or_default();
    let mut feed = state
        .feed
        .get_feed(&device_id, page.unwrap_or(0), size.unwrap_or(DEFAULT_PAGE_SIZE), after)
        .await
        .map_err(reject)?;

    let items = std::mem::take(&mut feed.items);
    feed.items = state.localizer.localize_all(items, lang.as_deref()).await;
    Ok(Json(feed))
}

#[get("/api/v1/news/<id>?<lang>")]
async fn get_news(state: &State<AppState>, id: i64, lang: Option<String>) -> ApiResult<NewsItem> {
    let item = state.feed.get_by_id(id).await.map_err(reject)?;
    Ok(Json(state.localizer.localize(item, lang.as_deref()).await))
}

#[post("/api/v1/news", data = "<body>")]
async fn create_news(state: &State<AppState>, body: Json<NewsCreateRequest>) -> std::result::Result<Custom<Json<NewsItem>>, Status> {
    let item = state.news.create(body.into_inner()).await.map_err(reject)?;
    Ok(Custom(Status::Created, Json(item)))
}

#[get("/api/v1/categories")]
async fn list_categories(state: &State<AppState>) -> ApiResult<Vec<Category>> {
    categories::list_active(&state.db).await.map(Json).map_err(reject)
}

#[derive(Deserialize)]
struct PreferencesUpdate {
    category_ids: Vec<i64>,
}

#[get("/api/v1/devices/<device_id>/preferences")]
async fn get_preferences(state: &State<AppState>, device_id: &str) -> ApiResult<Vec<Category>> {
    state.feed.get_preferences(device_id).await.map(Json).map_err(reject)
}

#[put("/api/v1/devices/<device_id>/preferences", data = "<body>")]
async fn update_preferences(
    state: &State<AppState>,
    device_id: &str,
    body: Json<PreferencesUpdate>,
) -> ApiResult<Vec<Category>> {
    state
        .feed
        .update_preferences(device_id, &body.category_ids)
        .await
        .map(Json)
        .map_err(reject)
}

#[post("/api/v1/news/<id>/like?<device_id>")]
async fn like(state: &State<AppState>, id: i64, device_id: Option<String>) -> ApiResult<LikeStatus> {
    let device_id = require_device(device_id)?;
    state.engagement.like(id, &device_id).await.map(Json).map_err(reject)
}

#[delete("/api/v1/news/<id>/like?<device_id>")]
async fn unlike(state: &State<AppState>, id: i64, device_id: Option<String>) -> ApiResult<LikeStatus> {
    let device_id = require_device(device_id)?;
    state.engagement.unlike(id, &device_id).await.map(Json).map_err(reject)
}

#[get("/api/v1/news/<id>/like?<device_id>")]
async fn like_status(state: &State<AppState>, id: i64, device_id: Option<String>) -> ApiResult<LikeStatus> {
    let device_id = require_device(device_id)?;
    state.engagement.like_status(id, &device_id).await.map(Json).map_err(reject)
}

#[post("/api/v1/news/<id>/bookmark?<device_id>")]
async fn add_bookmark(state: &State<AppState>, id: i64, device_id: Option<String>) -> ApiResult<Bookmark> {
    let device_id = require_device(device_id)?;
    state.engagement.add_bookmark(id, &device_id).await.map(Json).map_err(reject)
}

#[delete("/api/v1/news/<id>/bookmark?<device_id>")]
async fn remove_bookmark(state: &State<AppState>, id: i64, device_id: Option<String>) -> ApiResult<BookmarkStatus> {
    let device_id = require_device(device_id)?;
    state.engagement.remove_bookmark(id, &device_id).await.map(Json).map_err(reject)
}

#[get("/api/v1/news/<id>/bookmark?<device_id>")]
async fn bookmark_status(state: &State<AppState>, id: i64, device_id: Option<String>) -> ApiResult<BookmarkStatus> {
    let device_id = require_device(device_id)?;
    state.engagement.bookmark_status(id, &device_id).await.map(Json).map_err(reject)
}

#[get("/api/v1/bookmarks?<device_id>&<page>&<size>")]
async fn list_bookmarks(
    state: &State<AppState>,
    device_id: Option<String>,
    page: Option<u32>,
    size: Option<u32>,
) -> ApiResult<FeedPage> {
    let device_id = require_device(device_id)?;
    state
        .engagement
        .list_bookmarks(&device_id, page.unwrap_or(0), size.unwrap_or(DEFAULT_PAGE_SIZE))
        .await
        .map(Json)
        .map_err(reject)
}

#[derive(Serialize)]
struct IngestResponse {
    started: bool,
}

/// Starts a background ingestion run unless one is already active.
#[post("/api/v1/ingest")]
async fn trigger_ingest(state: &State<AppState>) -> Custom<Json<IngestResponse>> {
    if state.ingestor.is_running() {
        return Custom(Status::Conflict, Json(IngestResponse { started: false }));
    }

    let ingestor = state.ingestor.clone();
    tokio::spawn(async move {
        if let Some(report) = ingestor.run_all().await {
            tracing::info!(saved = report.saved(), "manual ingestion finished");
        }
    });
    Custom(Status::Accepted, Json(IngestResponse { started: true }))
}

/// Builds the Rocket instance with managed state, applying `[server] bind/port` when set.
pub fn build_rocket(state: AppState, server: Option<&ServerConfig>) -> Rocket<Build> {
    let mut fig = rocket::Config::figment();
    if let Some(server) = server {
        if let Some(ref bind) = server.bind {
            fig = fig.merge(("address", bind.clone()));
        }
        if let Some(port) = server.port {
            fig = fig.merge(("port", port));
        }
    }

    rocket::custom(fig).manage(state).mount(
        "/",
        routes![
            health,
            get_feed,
            get_news,
            create_news,
            list_categories,
            get_preferences,
            update_preferences,
            like,
            unlike,
            like_status,
            add_bookmark,
            remove_bookmark,
            bookmark_status,
            list_bookmarks,
            trigger_ingest,
        ],
    )
}

/// Runs until Rocket shuts down (Ctrl-C / SIGTERM).
pub async fn launch_rocket(state: AppState, server: Option<ServerConfig>) -> Result<()> {
    tracing::info!("Starting Rocket HTTP server");
    build_rocket(state, server.as_ref())
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
