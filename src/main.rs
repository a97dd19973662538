use anyhow::Result;
use clap::Parser;
use log::{info, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;

use coin_tracker::api::{CoinGeckoClient, QuoteProvider};
use coin_tracker::cli::Cli;
use coin_tracker::config::Config;
use coin_tracker::logging;
use coin_tracker::metrics::Metrics;
use coin_tracker::scheduler::HistoryScheduler;
use coin_tracker::security::RateLimiter;
use coin_tracker::services::HistoryService;
use coin_tracker::storage::{HistoryStore, MemoryStore, PgStore, SnapshotStore};
use coin_tracker::utils::{Clock, RefreshCache, SystemClock};
use coin_tracker::web::{AppContext, WebServer};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration loading failed: {}", e))?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let level = if cli.debug {
        LevelFilter::Debug
    } else {
        logging::parse_level(&config.logging.level)?
    };
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| config.logging.file.as_ref().map(PathBuf::from));
    logging::init(level, log_file.as_deref())?;

    info!("Starting coin tracker...");

    let metrics = Arc::new(Metrics::new()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (snapshots, history): (Arc<dyn SnapshotStore>, Arc<dyn HistoryStore>) =
        if cli.in_memory || config.database.url.is_empty() {
            info!("Using in-memory storage");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        } else {
            let store = Arc::new(PgStore::connect(&config.database).await?);
            store.migrate().await?;
            info!("Connected to Postgres");
            (store.clone(), store)
        };

    let provider: Arc<dyn QuoteProvider> = Arc::new(CoinGeckoClient::new(&config.upstream));
    info!("Upstream client targets {}", config.upstream.base_url);

    let cache = Arc::new(RefreshCache::new(
        provider.clone(),
        snapshots.clone(),
        clock.clone(),
        config.cache.freshness(),
    ));
    let history_service = Arc::new(HistoryService::new(snapshots, history.clone(), clock.clone()));

    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = HistoryScheduler::new(
            provider,
            history,
            clock,
            config.scheduler.interval(),
            metrics.clone(),
        );
        Some(scheduler.spawn())
    } else {
        info!("History scheduler disabled");
        None
    };

    let ctx = AppContext {
        cache,
        history: history_service,
        metrics,
        rate_limiter: Arc::new(RateLimiter::new(
            config.rate_limit.max_requests,
            config.rate_limit.window(),
        )),
    };

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
    };
    WebServer::new(config.server.clone(), ctx).run(shutdown).await?;

    if let Some(handle) = scheduler_handle {
        handle.abort();
    }
    info!("Coin tracker stopped");
    Ok(())
}
