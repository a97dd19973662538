use super::super::models::{AssetQuote, HistoryEntry};
use chrono::{DateTime, TimeZone, Utc};

// Fixed instant so stamps in assertions are predictable
pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn create_test_quote(coin_id: &str, price: f64) -> AssetQuote {
    AssetQuote {
        coin_id: coin_id.to_string(),
        name: capitalize(coin_id),
        symbol: coin_id.chars().take(3).collect(),
        price,
        market_cap: Some(price * 1_000_000.0),
        change_24h: Some(1.5),
        observed_at: test_time(),
    }
}

pub fn create_test_quotes(ids: &[&str]) -> Vec<AssetQuote> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| create_test_quote(id, 100.0 * (i as f64 + 1.0)))
        .collect()
}

pub fn create_test_entry(coin_id: &str, price: f64, snapshot_at: DateTime<Utc>) -> HistoryEntry {
    HistoryEntry::from_quote(&create_test_quote(coin_id, price), snapshot_at)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
