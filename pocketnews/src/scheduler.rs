// Background worker: periodic ingestion plus a daily retention sweep
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use common::SchedulerConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::select;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info};

use crate::ingestion::Ingestor;
use crate::retention;

pub fn parse_daily_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("invalid scheduler time '{}', expected HH:MM", value))
}

/// Next UTC instant strictly after `now` at wall-clock time `at`.
pub fn next_daily_run(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

pub struct Scheduler {
    ingestor: Arc<Ingestor>,
    pool: SqlitePool,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(ingestor: Arc<Ingestor>, pool: SqlitePool, config: SchedulerConfig) -> Self {
        Self { ingestor, pool, config }
    }

    /// Runs both periodic loops until `shutdown` is notified.
    pub async fn run(self, shutdown: Arc<Notify>) -> Result<()> {
        let retention_at = parse_daily_time(self.config.retention_time())?;
        info!(
            ingest_every_minutes = self.config.ingest_interval_minutes(),
            retention_at = %retention_at,
            "worker: scheduler starting"
        );

        tokio::join!(
            self.ingest_loop(shutdown.clone()),
            self.retention_loop(retention_at, shutdown)
        );

        info!("worker: scheduler stopped");
        Ok(())
    }

    async fn ingest_loop(&self, shutdown: Arc<Notify>) {
        let notified = shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let period = Duration::from_secs(self.config.ingest_interval_minutes() * 60);
        if self.config.run_on_startup() {
            fire_ingestion(self.ingestor.clone()).await;
        }

        loop {
            select! {
                _ = tokio::time::sleep(period) => fire_ingestion(self.ingestor.clone()).await,
                _ = &mut notified => {
                    info!("worker: ingestion loop shutting down");
                    break;
                }
            }
        }
    }

    async fn retention_loop(&self, at: NaiveTime, shutdown: Arc<Notify>) {
        let notified = shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        loop {
            let now = Utc::now();
            let next = next_daily_run(now, at);
            let wait = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            info!(next = %next, "worker: next retention sweep scheduled");

            select! {
                _ = tokio::time::sleep(wait) => fire_retention(self.pool.clone()).await,
                _ = &mut notified => {
                    info!("worker: retention loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Each firing runs in its own task so a panic is contained and logged.
pub async fn fire_ingestion(ingestor: Arc<Ingestor>) {
    match tokio::spawn(async move { ingestor.run_all().await }).await {
        Ok(Some(report)) => info!(saved = report.saved(), failed = report.failed(), "scheduled ingestion finished"),
        Ok(None) => info!("scheduled ingestion skipped, previous run still active"),
        Err(e) => error!("ingestion task aborted: {}", e),
    }
}

pub async fn fire_retention(pool: SqlitePool) {
    match tokio::spawn(async move { retention::sweep(&pool, Utc::now()).await }).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!("retention sweep failed: {}", e),
        Err(e) => error!("retention task aborted: {}", e),
    }
}
