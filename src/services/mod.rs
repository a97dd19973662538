use crate::error::{Error, Result};
use crate::models::HistoryEntry;
use crate::storage::{HistoryStore, SnapshotStore};
use crate::utils::clock::Clock;
use crate::validation::validate_history_payload;
use log::{info, warn};
use serde_json::Value;
use std::sync::Arc;

/// How a promotion request chose its source rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionMode {
    /// Copied from the current snapshot.
    FromSnapshot,
    /// Supplied by the caller.
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionOutcome {
    pub mode: PromotionMode,
    pub inserted: usize,
}

/// Snapshot-to-history promotion and per-coin history queries.
pub struct HistoryService {
    snapshots: Arc<dyn SnapshotStore>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
}

impl HistoryService {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            snapshots,
            history,
            clock,
        }
    }

    /// Runs the explicit mode when `data` carries a payload, the snapshot
    /// mode when it is absent or null.
    pub async fn promote(&self, data: Option<&Value>) -> Result<PromotionOutcome> {
        match data {
            None | Some(Value::Null) => Ok(PromotionOutcome {
                mode: PromotionMode::FromSnapshot,
                inserted: self.promote_snapshot().await?,
            }),
            Some(payload) => Ok(PromotionOutcome {
                mode: PromotionMode::Explicit,
                inserted: self.append_entries(payload).await?,
            }),
        }
    }

    /// Copies every current snapshot row into history, stamped now.
    pub async fn promote_snapshot(&self) -> Result<usize> {
        let current = self.snapshots.load_all().await?;
        if current.is_empty() {
            warn!("History promotion skipped: current snapshot is empty");
            return Err(Error::EmptySource);
        }

        let snapshot_at = self.clock.now();
        let entries: Vec<HistoryEntry> = current
            .iter()
            .map(|quote| HistoryEntry::from_quote(quote, snapshot_at))
            .collect();

        let inserted = self.history.append(&entries).await?;
        info!("Promoted {} snapshot rows to history", inserted);
        Ok(inserted)
    }

    /// Validates the whole payload, then appends every entry stamped now.
    /// Nothing is written if any item is invalid.
    pub async fn append_entries(&self, payload: &Value) -> Result<usize> {
        let candidates = validate_history_payload(payload)?;

        let snapshot_at = self.clock.now();
        let entries: Vec<HistoryEntry> = candidates
            .into_iter()
            .map(|candidate| candidate.into_entry(snapshot_at))
            .collect();

        let inserted = self.history.append(&entries).await?;
        info!("Appended {} caller-supplied history rows", inserted);
        Ok(inserted)
    }

    pub async fn coin_history(&self, coin_id: &str) -> Result<Vec<HistoryEntry>> {
        let entries = self.history.find_by_coin(coin_id).await?;
        if entries.is_empty() {
            return Err(Error::NotFound(coin_id.to_string()));
        }
        Ok(entries)
    }
}
