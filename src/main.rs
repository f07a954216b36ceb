//! Leaderboard Service
//!
//! Serves student score leaderboards over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Leaderboard Service                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  HTTP API    │───▶│ Coordinator  │───▶│ Record Store │       │
//! │  │  (:5566)     │    │              │    │  (durable)   │       │
//! │  └──────────────┘    └──────┬───────┘    └──────────────┘       │
//! │                             │            ┌──────────────┐       │
//! │                             └───────────▶│  Rank Cache  │       │
//! │                                          └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use leaderboard::adapters::{FileRecordStore, InMemoryRankCache, InMemoryRecordStore};
use leaderboard::domain::RecordStore;
use leaderboard::error::{Error, Result};
use leaderboard::{server, CoordinatorConfig, RankingCoordinator};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Leaderboard - ranked student scores with a write-through rank cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API server bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:5566")]
    listen_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: String,

    /// JSON snapshot file for durable records (in-memory when unset)
    #[arg(long, env = "DATA_FILE")]
    data_file: Option<PathBuf>,

    /// Record store call timeout in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "2000")]
    store_timeout_ms: u64,

    /// Rank cache call timeout in milliseconds
    #[arg(long, env = "CACHE_TIMEOUT_MS", default_value = "500")]
    cache_timeout_ms: u64,

    /// Per-student lock wait in milliseconds
    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value = "5000")]
    lock_timeout_ms: u64,

    /// Leaderboard length when a request gives none
    #[arg(long, env = "DEFAULT_RANK_COUNT", default_value = "10")]
    default_rank_count: usize,

    /// Seed for initial scores (random when unset)
    #[arg(long, env = "SCORE_SEED")]
    score_seed: Option<u64>,

    /// Skip loading durable records into the cache at start-up
    #[arg(long, env = "NO_WARM_UP")]
    no_warm_up: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            cache_timeout: Duration::from_millis(self.cache_timeout_ms),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            default_rank_count: self.default_rank_count,
            score_seed: self.score_seed,
            warm_cache_on_start: !self.no_warm_up,
            ..Default::default()
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Leaderboard");
    info!("  API address: {}", args.listen_addr);
    info!("  Metrics address: {}", args.metrics_addr);
    match &args.data_file {
        Some(path) => info!("  Data file: {}", path.display()),
        None => info!("  Data file: none (records kept in memory)"),
    }

    let records: Arc<dyn RecordStore> = match &args.data_file {
        Some(path) => Arc::new(FileRecordStore::open(path).await?),
        None => Arc::new(InMemoryRecordStore::new()),
    };
    let cache = Arc::new(InMemoryRankCache::new());

    let config = args.coordinator_config();
    let warm = config.warm_cache_on_start;
    let coordinator = Arc::new(RankingCoordinator::new(config, records, cache)?);

    if warm {
        match coordinator.warm_up().await {
            Ok(count) => info!("Rank cache warmed with {} students", count),
            Err(e) => {
                error!("Cache warm-up failed: {}", e);
                error!("Continuing anyway - reads will repopulate the cache");
            }
        }
    }

    let shutdown = CancellationToken::new();

    let api_listener = bind(&args.listen_addr).await?;
    let metrics_listener = bind(&args.metrics_addr).await?;

    let api = tokio::spawn(server::serve(
        api_listener,
        coordinator.clone(),
        shutdown.clone(),
    ));
    let metrics = tokio::spawn(server::serve_metrics(
        metrics_listener,
        coordinator.clone(),
        shutdown.clone(),
    ));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    shutdown.cancel();

    for (name, handle) in [("API", api), ("Metrics", metrics)] {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("{} server error: {}", name, e),
            Err(e) => error!("{} server task failed: {}", name, e),
        }
    }

    info!("Leaderboard shutdown complete");
    Ok(())
}

async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("Failed to bind {}: {}", addr, e)))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn", level)));

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
