#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use coin_tracker::api::QuoteProvider;
use coin_tracker::error::{Error, Result};
use coin_tracker::metrics::Metrics;
use coin_tracker::models::AssetQuote;
use coin_tracker::security::RateLimiter;
use coin_tracker::services::HistoryService;
use coin_tracker::storage::MemoryStore;
use coin_tracker::utils::{ManualClock, RefreshCache};
use coin_tracker::web::AppContext;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn create_test_quote(coin_id: &str, name: &str, symbol: &str, price: f64) -> AssetQuote {
    AssetQuote {
        coin_id: coin_id.to_string(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        price,
        market_cap: Some(price * 1_000_000.0),
        change_24h: Some(0.5),
        observed_at: test_time(),
    }
}

pub fn top_coins() -> Vec<AssetQuote> {
    vec![
        create_test_quote("bitcoin", "Bitcoin", "btc", 64000.0),
        create_test_quote("ethereum", "Ethereum", "eth", 3200.0),
        create_test_quote("tether", "Tether", "usdt", 1.0),
    ]
}

/// Answers `fetch_quotes` from a fixed script, one entry per call.
/// Calls past the end of the script fail as upstream errors.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Vec<AssetQuote>>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Vec<AssetQuote>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for ScriptedProvider {
    async fn fetch_quotes(&self) -> Result<Vec<AssetQuote>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::UpstreamUnavailable("script exhausted".to_string())))
    }
}

pub struct TestApp {
    pub ctx: AppContext,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub provider: Arc<ScriptedProvider>,
}

impl TestApp {
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

pub fn build_app(script: Vec<Result<Vec<AssetQuote>>>) -> TestApp {
    build_app_with_limit(script, 1000)
}

pub fn build_app_with_limit(script: Vec<Result<Vec<AssetQuote>>>, max_requests: u32) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(test_time()));
    let provider = Arc::new(ScriptedProvider::new(script));

    let cache = Arc::new(RefreshCache::new(
        provider.clone(),
        store.clone(),
        clock.clone(),
        Duration::seconds(60),
    ));
    let history = Arc::new(HistoryService::new(store.clone(), store.clone(), clock.clone()));

    let ctx = AppContext {
        cache,
        history,
        metrics: Arc::new(Metrics::new().unwrap()),
        rate_limiter: Arc::new(RateLimiter::new(max_requests, std::time::Duration::from_secs(900))),
    };

    TestApp {
        ctx,
        store,
        clock,
        provider,
    }
}
