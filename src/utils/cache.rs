use crate::api::QuoteProvider;
use crate::error::{Error, Result};
use crate::models::AssetQuote;
use crate::storage::SnapshotStore;
use crate::utils::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Where the quotes handed out by `RefreshCache::get_quotes` came from.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteOrigin {
    /// Fetched from upstream on this call.
    Upstream,
    /// Served from a cache entry still inside the freshness window.
    Cache,
    /// Served from an expired cache entry because the refresh failed.
    Stale { reason: String },
}

#[derive(Debug, Clone)]
pub struct QuoteSet {
    pub quotes: Arc<Vec<AssetQuote>>,
    pub fetched_at: DateTime<Utc>,
    pub origin: QuoteOrigin,
}

impl QuoteSet {
    pub fn from_cache(&self) -> bool {
        !matches!(self.origin, QuoteOrigin::Upstream)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.origin, QuoteOrigin::Stale { .. })
    }
}

#[derive(Debug, Clone)]
struct CachedQuoteSet {
    quotes: Arc<Vec<AssetQuote>>,
    fetched_at: DateTime<Utc>,
}

/// Memoizes the last successful upstream fetch.
///
/// Within `freshness` of a successful fetch every caller gets the cached
/// quotes without touching upstream. Past it the next caller refreshes:
/// the result replaces the snapshot store and the cache. When the refresh
/// fails and a cached set exists it is served as stale and its timestamp is
/// left alone, so the following call tries upstream again.
///
/// Refreshes are single-flight: concurrent callers queue behind the one
/// in-flight fetch and re-check freshness once they get their turn.
pub struct RefreshCache {
    provider: Arc<dyn QuoteProvider>,
    snapshots: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    state: RwLock<Option<CachedQuoteSet>>,
    refill: Mutex<RefillState>,
    attempts: AtomicU64,
}

/// Outcome of the latest refresh attempt, guarded by the refill gate.
#[derive(Debug, Default)]
struct RefillState {
    failure: Option<Error>,
}

impl RefreshCache {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        freshness: Duration,
    ) -> Self {
        Self {
            provider,
            snapshots,
            clock,
            freshness,
            state: RwLock::new(None),
            refill: Mutex::new(RefillState::default()),
            attempts: AtomicU64::new(0),
        }
    }

    pub async fn get_quotes(&self) -> Result<QuoteSet> {
        if let Some(hit) = self.fresh_hit().await {
            debug!("Serving {} quotes from cache", hit.quotes.len());
            return Ok(hit);
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut refill = self.refill.lock().await;
        if let Some(hit) = self.fresh_hit().await {
            debug!("Refresh completed while waiting, serving cache");
            return Ok(hit);
        }
        // An attempt finished while this caller waited and it failed:
        // share its outcome instead of going upstream again.
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(failure) = &refill.failure {
                debug!("Refresh failed while waiting, reusing its outcome");
                return self.serve_stale(share_failure(failure)).await;
            }
        }

        let outcome = self.refresh().await;
        refill.failure = outcome.as_ref().err().map(share_failure);
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(set) => Ok(set),
            Err(err) => self.serve_stale(err).await,
        }
    }

    /// Timestamp of the cached set, if any.
    pub async fn last_fetch_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.as_ref().map(|cached| cached.fetched_at)
    }

    async fn fresh_hit(&self) -> Option<QuoteSet> {
        let state = self.state.read().await;
        let cached = state.as_ref()?;
        if self.clock.now() - cached.fetched_at < self.freshness {
            Some(QuoteSet {
                quotes: cached.quotes.clone(),
                fetched_at: cached.fetched_at,
                origin: QuoteOrigin::Cache,
            })
        } else {
            None
        }
    }

    async fn refresh(&self) -> Result<QuoteSet> {
        let started_at = self.clock.now();
        let quotes = self.provider.fetch_quotes().await?;
        if quotes.is_empty() {
            return Err(Error::UpstreamUnavailable("upstream returned no quotes".to_string()));
        }

        self.snapshots.replace_all(&quotes).await?;

        let quotes = Arc::new(quotes);
        *self.state.write().await = Some(CachedQuoteSet {
            quotes: quotes.clone(),
            fetched_at: started_at,
        });
        info!("Refreshed {} quotes from upstream", quotes.len());

        Ok(QuoteSet {
            quotes,
            fetched_at: started_at,
            origin: QuoteOrigin::Upstream,
        })
    }

    async fn serve_stale(&self, err: Error) -> Result<QuoteSet> {
        let degradable = matches!(err, Error::UpstreamUnavailable(_) | Error::StoreFailure(_));
        let state = self.state.read().await;
        match state.as_ref() {
            Some(cached) if degradable => {
                warn!("Refresh failed ({}), serving stale cache", err);
                Ok(QuoteSet {
                    quotes: cached.quotes.clone(),
                    fetched_at: cached.fetched_at,
                    origin: QuoteOrigin::Stale {
                        reason: err.to_string(),
                    },
                })
            }
            _ => Err(err),
        }
    }
}

/// Rebuilds a refresh error so queued callers can be handed their own copy.
fn share_failure(err: &Error) -> Error {
    match err {
        Error::UpstreamUnavailable(reason) => Error::UpstreamUnavailable(reason.clone()),
        Error::StoreFailure(reason) => Error::StoreFailure(reason.clone()),
        other => Error::InternalError(other.to_string()),
    }
}
