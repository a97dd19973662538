use crate::error::Result;
use crate::models::{AssetQuote, HistoryEntry};
use crate::storage::{HistoryStore, SnapshotStore};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Process-local store backing `--in-memory` runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    current: RwLock<Vec<AssetQuote>>,
    history: RwLock<Vec<HistoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn replace_all(&self, quotes: &[AssetQuote]) -> Result<usize> {
        let mut seen = HashSet::with_capacity(quotes.len());
        let rows: Vec<AssetQuote> = quotes
            .iter()
            .filter(|quote| seen.insert(quote.coin_id.as_str()))
            .cloned()
            .collect();

        let mut current = self.current.write().await;
        *current = rows;
        Ok(current.len())
    }

    async fn load_all(&self) -> Result<Vec<AssetQuote>> {
        Ok(self.current.read().await.clone())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, entries: &[HistoryEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        self.history.write().await.extend_from_slice(entries);
        Ok(entries.len())
    }

    async fn find_by_coin(&self, coin_id: &str) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self
            .history
            .read()
            .await
            .iter()
            .filter(|entry| entry.coin_id == coin_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        entries.sort_by_key(|entry| entry.snapshot_at);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::common::{create_test_entry, create_test_quote};
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn test_replace_all_swaps_collection() {
        let store = MemoryStore::new();
        store
            .replace_all(&[create_test_quote("bitcoin", 64000.0), create_test_quote("ethereum", 3100.0)])
            .await
            .unwrap();

        let inserted = store.replace_all(&[create_test_quote("solana", 150.0)]).await.unwrap();
        assert_eq!(inserted, 1);

        let rows = store.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].coin_id, "solana");
    }

    #[tokio::test]
    async fn test_replace_all_keeps_coin_id_unique() {
        let store = MemoryStore::new();
        let inserted = store
            .replace_all(&[create_test_quote("bitcoin", 1.0), create_test_quote("bitcoin", 2.0)])
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(store.load_all().await.unwrap()[0].price, 1.0);
    }

    #[tokio::test]
    async fn test_find_by_coin_orders_by_snapshot_time() {
        let store = MemoryStore::new();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let t2 = t1 + Duration::hours(1);
        let t3 = t1 + Duration::hours(2);

        store
            .append(&[
                create_test_entry("bitcoin", 1.0, t1),
                create_test_entry("bitcoin", 3.0, t3),
                create_test_entry("ethereum", 9.0, t1),
                create_test_entry("bitcoin", 2.0, t2),
            ])
            .await
            .unwrap();

        let history = store.find_by_coin("bitcoin").await.unwrap();
        let stamps: Vec<_> = history.iter().map(|e| e.snapshot_at).collect();
        assert_eq!(stamps, vec![t1, t2, t3]);
        assert!(store.find_by_coin("doesnotexist").await.unwrap().is_empty());
    }
}
