/*
pocketnews - single-binary main.rs
This binary starts the Rocket HTTP server and runs the background worker inside the same process.
*/

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use common::{init_db_pool, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pocketnews::ingestion::Ingestor;
use pocketnews::llm::enrichment::Enricher;
use pocketnews::llm::remote::RemoteLlmProvider;
use pocketnews::llm::LlmProvider;
use pocketnews::scheduler::Scheduler;
use pocketnews::server::{launch_rocket, AppState};
use pocketnews::{retention, storage};

#[derive(Parser, Debug)]
#[command(name = "pocketnews", about = "PocketNews single-binary server + worker")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable background worker (run server only)
    #[arg(long)]
    no_worker: bool,

    /// Run worker only (do not bind HTTP server)
    #[arg(long)]
    worker_only: bool,

    /// Run one ingestion pass and one retention sweep, then exit
    #[arg(long)]
    once: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");
    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = match Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load configuration: {:#}", e);
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let db_pool = init_db_pool(&config.database.path).await.map_err(|e| {
        error!(db_path = %config.database.path, "failed to initialize database pool: {:#}", e);
        e
    })?;
    storage::ensure_schema(&db_pool).await?;
    storage::categories::sync_seeds(&db_pool, &config.categories).await?;

    let llm = match config.llm {
        Some(ref llm_config) => match create_llm_provider(llm_config) {
            Ok(provider) => provider,
            Err(e) => {
                error!("Failed to initialize LLM provider, enrichment will truncate: {:#}", e);
                None
            }
        },
        None => None,
    };
    let max_tokens = config
        .llm
        .as_ref()
        .and_then(|l| l.remote.as_ref())
        .and_then(|r| r.max_tokens)
        .unwrap_or(300);
    let enricher = Enricher::new(llm, max_tokens);

    let ingestor = Arc::new(Ingestor::from_config(db_pool.clone(), &config, enricher.clone())?);

    if args.once {
        info!("Running a single ingestion pass and retention sweep");
        if let Some(report) = ingestor.run_all().await {
            for source in &report.sources {
                info!(source = %source.source, saved = source.saved, failed = source.failed, "source summary");
            }
        }
        retention::sweep(&db_pool, Utc::now()).await?;
        return Ok(());
    }

    let shutdown_notify = Arc::new(Notify::new());
    let scheduler = Scheduler::new(ingestor.clone(), db_pool.clone(), config.scheduler.clone());

    if args.worker_only {
        info!("Starting in worker-only mode");
        let worker = scheduler.run(shutdown_notify.clone());
        tokio::pin!(worker);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, notifying worker to shutdown");
                shutdown_notify.notify_waiters();
                if tokio::time::timeout(Duration::from_secs(5), &mut worker).await.is_err() {
                    warn!("worker did not stop within grace period");
                }
            }
            res = &mut worker => {
                if let Err(e) = res {
                    error!("worker encountered an error: {:#}", e);
                }
            }
        }
        info!("worker-only run finished");
        return Ok(());
    }

    let mut worker_handle = None;
    if !args.no_worker {
        info!("Spawning background worker task");
        let w_shutdown = shutdown_notify.clone();
        worker_handle = Some(tokio::spawn(async move {
            let res = scheduler.run(w_shutdown).await;
            if let Err(ref e) = res {
                error!("background worker failed: {:#}", e);
            }
            res
        }));
    } else {
        info!("Background worker disabled via CLI (--no-worker)");
    }

    let state = AppState::from_config(db_pool.clone(), &config, enricher, ingestor)?;

    info!("Launching Rocket HTTP server");
    if let Err(e) = launch_rocket(state, config.server.clone()).await {
        error!("Rocket server failed: {:#}", e);
    }

    info!("HTTP server stopped; notifying worker to shutdown");
    shutdown_notify.notify_waiters();

    if let Some(handle) = worker_handle {
        match tokio::time::timeout(Duration::from_secs(20), handle).await {
            Ok(Ok(Ok(()))) => info!("worker exited cleanly"),
            Ok(Ok(Err(e))) => error!("worker task returned an error: {:#}", e),
            Ok(Err(join_err)) => error!(%join_err, "worker task panicked"),
            Err(_) => info!("Timed out waiting for worker to exit; continuing shutdown"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Builds the generative backend from `[llm]`. `Ok(None)` means enrichment always truncates.
fn create_llm_provider(llm_config: &common::LlmConfig) -> Result<Option<Arc<dyn LlmProvider>>> {
    let adapter = llm_config.adapter.as_deref().unwrap_or("none");
    match adapter {
        "remote" => {
            let remote = llm_config
                .remote
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Remote adapter selected but [llm.remote] is missing"))?;

            let api_key_env = remote
                .api_key_env
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Missing api_key_env in remote config"))?;
            let api_key = std::env::var(api_key_env)
                .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?;

            let api_url = remote
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com/v1/messages".to_string());
            let model = remote
                .model
                .clone()
                .unwrap_or_else(|| "claude-3-haiku-20240307".to_string());

            let mut provider = RemoteLlmProvider::new(api_url, api_key, model)
                .with_defaults(remote.timeout_seconds.unwrap_or(30), remote.max_tokens.unwrap_or(300));
            if let Some(ref version) = remote.api_version {
                provider = provider.with_api_version(version);
            }
            info!(model = provider.model(), "LLM provider initialized: remote");
            Ok(Some(Arc::new(provider) as Arc<dyn LlmProvider>))
        }
        "none" => {
            info!("LLM adapter 'none': enrichment will use truncation");
            Ok(None)
        }
        _ => anyhow::bail!("Unknown LLM adapter type: {}", adapter),
    }
}
