use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// One asset's price as observed on a single upstream fetch.
///
/// Rows of the current snapshot have exactly this shape; `coin_id` is the
/// snapshot's unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetQuote {
    pub coin_id: String,
    pub name: String,
    pub symbol: String,
    pub price: f64,
    pub market_cap: Option<f64>,
    pub change_24h: Option<f64>,
    #[serde(rename = "lastUpdated", alias = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

/// An append-only record of an asset's price at `snapshot_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub coin_id: String,
    pub name: String,
    pub symbol: String,
    pub price: f64,
    pub market_cap: Option<f64>,
    pub change_24h: Option<f64>,
    pub snapshot_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_quote(quote: &AssetQuote, snapshot_at: DateTime<Utc>) -> Self {
        Self {
            coin_id: quote.coin_id.clone(),
            name: quote.name.clone(),
            symbol: quote.symbol.clone(),
            price: quote.price,
            market_cap: quote.market_cap,
            change_24h: quote.change_24h,
            snapshot_at,
        }
    }
}
