//! Persistence for the current snapshot and the price history.

use crate::error::Result;
use crate::models::{AssetQuote, HistoryEntry};
use async_trait::async_trait;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Latest known quote per asset, at most one row per `coin_id`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Swaps the whole collection for `quotes`. Assets absent from `quotes`
    /// are dropped. Readers never observe a half-written snapshot.
    async fn replace_all(&self, quotes: &[AssetQuote]) -> Result<usize>;

    async fn load_all(&self) -> Result<Vec<AssetQuote>>;
}

/// Append-only log of history entries.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends every entry or none of them.
    async fn append(&self, entries: &[HistoryEntry]) -> Result<usize>;

    /// Entries for `coin_id` ordered by `snapshot_at` ascending, ties in
    /// insertion order.
    async fn find_by_coin(&self, coin_id: &str) -> Result<Vec<HistoryEntry>>;
}
