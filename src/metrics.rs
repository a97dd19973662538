use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use crate::error::{Error, Result};

/// Service counters, exported on `/metrics`.
pub struct Metrics {
    registry: Registry,
    pub upstream_refreshes: IntCounter,
    pub cache_hits: IntCounter,
    pub stale_serves: IntCounter,
    pub refresh_failures: IntCounter,
    pub history_rows_appended: IntCounter,
    pub scheduler_runs: IntCounter,
    pub scheduler_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let upstream_refreshes = IntCounter::new(
            "coin_upstream_refreshes_total",
            "Quote requests answered by a fresh upstream fetch",
        )?;
        let cache_hits = IntCounter::new(
            "coin_cache_hits_total",
            "Quote requests answered from the fresh cache",
        )?;
        let stale_serves = IntCounter::new(
            "coin_stale_serves_total",
            "Quote requests answered with stale data after a failed refresh",
        )?;
        let refresh_failures = IntCounter::new(
            "coin_refresh_failures_total",
            "Quote requests that failed with no cache to fall back on",
        )?;
        let history_rows_appended = IntCounter::new(
            "coin_history_rows_appended_total",
            "History rows appended by promotion or the scheduler",
        )?;
        let scheduler_runs = IntCounter::new(
            "coin_scheduler_runs_total",
            "Scheduled history runs started",
        )?;
        let scheduler_failures = IntCounter::new(
            "coin_scheduler_failures_total",
            "Scheduled history runs that failed",
        )?;

        registry.register(Box::new(upstream_refreshes.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(stale_serves.clone()))?;
        registry.register(Box::new(refresh_failures.clone()))?;
        registry.register(Box::new(history_rows_appended.clone()))?;
        registry.register(Box::new(scheduler_runs.clone()))?;
        registry.register(Box::new(scheduler_failures.clone()))?;

        Ok(Self {
            registry,
            upstream_refreshes,
            cache_hits,
            stale_serves,
            refresh_failures,
            history_rows_appended,
            scheduler_runs,
            scheduler_failures,
        })
    }

    /// Prometheus text exposition of every registered counter.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::InternalError(e.to_string()))
    }
}
