//! Periodic history capture.
//!
//! Every run fetches straight from the provider, bypassing the refresh cache
//! and the snapshot store, and appends one history row per asset.

use crate::api::QuoteProvider;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::models::HistoryEntry;
use crate::storage::HistoryStore;
use crate::utils::clock::Clock;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub struct HistoryScheduler {
    provider: Arc<dyn QuoteProvider>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    metrics: Arc<Metrics>,
}

impl HistoryScheduler {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            provider,
            history,
            clock,
            interval,
            metrics,
        }
    }

    /// One capture: fetch, stamp every row with the same instant, append.
    pub async fn run_once(&self) -> Result<usize> {
        let quotes = self.provider.fetch_quotes().await?;
        if quotes.is_empty() {
            warn!("Scheduled history run fetched no quotes");
            return Ok(0);
        }

        let snapshot_at = self.clock.now();
        let entries: Vec<HistoryEntry> = quotes
            .iter()
            .map(|quote| HistoryEntry::from_quote(quote, snapshot_at))
            .collect();

        let inserted = self.history.append(&entries).await?;
        self.metrics.history_rows_appended.inc_by(inserted as u64);
        Ok(inserted)
    }

    async fn tick(&self) {
        self.metrics.scheduler_runs.inc();
        match self.run_once().await {
            Ok(inserted) => info!("Scheduled history run appended {} rows", inserted),
            Err(e) => {
                self.metrics.scheduler_failures.inc();
                error!("Scheduled history run failed: {}", e);
            }
        }
    }

    /// Runs forever on interval boundaries. A failed run is logged and the
    /// loop waits for the next boundary; runs that fall behind are skipped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let now = self.clock.now();
            let first = next_run_after(now, self.interval);
            info!("History scheduler started, first run at {}", first);

            let delay = (first - now).to_std().unwrap_or(Duration::ZERO);
            let start = Instant::now();
            let mut ticker = interval_at(start.checked_add(delay).unwrap_or(start), self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}

/// First boundary strictly after `from`, boundaries being whole multiples
/// of `interval` since the Unix epoch. An hourly interval lands on the top
/// of each hour.
pub fn next_run_after(from: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let period = interval.as_millis() as i64;
    if period <= 0 {
        return from;
    }
    let elapsed = from.timestamp_millis().rem_euclid(period);
    from + chrono::Duration::milliseconds(period - elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockQuoteProvider;
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use crate::tests::common::{create_test_quotes, test_time};
    use crate::utils::clock::ManualClock;
    use chrono::TimeZone;

    const HOUR: Duration = Duration::from_secs(3600);

    fn build_scheduler(provider: MockQuoteProvider) -> (HistoryScheduler, Arc<MemoryStore>, Arc<Metrics>) {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let scheduler = HistoryScheduler::new(
            Arc::new(provider),
            store.clone(),
            Arc::new(ManualClock::new(test_time())),
            HOUR,
            metrics.clone(),
        );
        (scheduler, store, metrics)
    }

    #[test]
    fn test_next_run_is_top_of_next_hour() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 12, 17, 42).unwrap();
        assert_eq!(
            next_run_after(from, HOUR),
            Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap()
        );
        // Exactly on a boundary waits for the following one.
        assert_eq!(next_run_after(test_time(), HOUR), test_time() + chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn test_run_once_appends_one_row_per_asset() {
        let mut provider = MockQuoteProvider::new();
        provider
            .expect_fetch_quotes()
            .times(1)
            .returning(|| Ok(create_test_quotes(&["bitcoin", "ethereum", "solana"])));
        let (scheduler, store, metrics) = build_scheduler(provider);

        assert_eq!(scheduler.run_once().await.unwrap(), 3);
        assert_eq!(store.history_len().await, 3);
        assert_eq!(metrics.history_rows_appended.get(), 3);

        let rows = store.find_by_coin("solana").await.unwrap();
        assert_eq!(rows[0].snapshot_at, test_time());
    }

    #[tokio::test]
    async fn test_run_once_with_empty_fetch_writes_nothing() {
        let mut provider = MockQuoteProvider::new();
        provider.expect_fetch_quotes().returning(|| Ok(Vec::new()));
        let (scheduler, store, _metrics) = build_scheduler(provider);

        assert_eq!(scheduler.run_once().await.unwrap(), 0);
        assert_eq!(store.history_len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_tick_is_counted() {
        let mut provider = MockQuoteProvider::new();
        provider
            .expect_fetch_quotes()
            .returning(|| Err(Error::UpstreamUnavailable("timeout".to_string())));
        let (scheduler, store, metrics) = build_scheduler(provider);

        scheduler.tick().await;
        assert_eq!(metrics.scheduler_runs.get(), 1);
        assert_eq!(metrics.scheduler_failures.get(), 1);
        assert_eq!(store.history_len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_scheduler_runs_on_each_boundary() {
        let mut provider = MockQuoteProvider::new();
        provider
            .expect_fetch_quotes()
            .returning(|| Ok(create_test_quotes(&["bitcoin", "ethereum"])));
        let (scheduler, store, metrics) = build_scheduler(provider);

        let handle = scheduler.spawn();
        tokio::time::sleep(HOUR * 2 + Duration::from_secs(1)).await;
        handle.abort();

        assert_eq!(metrics.scheduler_runs.get(), 2);
        assert_eq!(store.history_len().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_firing_keeps_next_boundary() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = calls.clone();
        let mut provider = MockQuoteProvider::new();
        provider.expect_fetch_quotes().returning(move || {
            if seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(Error::UpstreamUnavailable("rate limited".to_string()))
            } else {
                Ok(create_test_quotes(&["bitcoin", "ethereum"]))
            }
        });
        let (scheduler, store, metrics) = build_scheduler(provider);

        let handle = scheduler.spawn();
        tokio::time::sleep(HOUR + Duration::from_secs(1)).await;
        assert_eq!(metrics.scheduler_failures.get(), 1);
        assert_eq!(store.history_len().await, 0);

        tokio::time::sleep(HOUR).await;
        handle.abort();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(metrics.scheduler_runs.get(), 2);
        assert_eq!(metrics.scheduler_failures.get(), 1);
        assert_eq!(store.history_len().await, 2);
        let rows = store.find_by_coin("bitcoin").await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
