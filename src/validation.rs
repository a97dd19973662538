use crate::error::{Result, Error};
use crate::models::HistoryEntry;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A caller-supplied history row that passed validation and is waiting for
/// its `snapshot_at` stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryCandidate {
    pub coin_id: String,
    pub name: String,
    pub symbol: String,
    pub price: f64,
    pub market_cap: Option<f64>,
    pub change_24h: Option<f64>,
}

impl HistoryCandidate {
    pub fn into_entry(self, snapshot_at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            coin_id: self.coin_id,
            name: self.name,
            symbol: self.symbol,
            price: self.price,
            market_cap: self.market_cap,
            change_24h: self.change_24h,
            snapshot_at,
        }
    }
}

/// Validates an explicit history payload.
///
/// Every item is checked and every problem is reported, so a rejected batch
/// comes back with the full list rather than the first failure.
pub fn validate_history_payload(data: &Value) -> Result<Vec<HistoryCandidate>> {
    let items = match data.as_array() {
        Some(items) => items,
        None => {
            return Err(Error::ValidationFailed(vec![
                "Request body must be an array of cryptocurrency data".to_string(),
            ]))
        }
    };
    if items.is_empty() {
        return Err(Error::ValidationFailed(vec![
            "History data array cannot be empty".to_string(),
        ]));
    }

    let empty = Map::new();
    let mut errors = Vec::new();
    let mut candidates = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let fields = item.as_object().unwrap_or(&empty);
        let before = errors.len();

        let coin_id = required_string(fields, "coinId", index, &mut errors);
        let name = required_string(fields, "name", index, &mut errors);
        let symbol = required_string(fields, "symbol", index, &mut errors);

        let price = match fields.get("price").and_then(Value::as_f64) {
            Some(price) if price >= 0.0 => Some(price),
            _ => {
                errors.push(format!(
                    "Item {}: price is required and must be a non-negative number",
                    index
                ));
                None
            }
        };

        let market_cap = match fields.get("marketCap") {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_f64() {
                Some(cap) if cap >= 0.0 => Some(cap),
                _ => {
                    errors.push(format!(
                        "Item {}: marketCap must be a non-negative number or null",
                        index
                    ));
                    None
                }
            },
        };

        let change_24h = match fields.get("change24h") {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_f64() {
                Some(change) => Some(change),
                None => {
                    errors.push(format!("Item {}: change24h must be a number or null", index));
                    None
                }
            },
        };

        if errors.len() == before {
            if let (Some(coin_id), Some(name), Some(symbol), Some(price)) = (coin_id, name, symbol, price) {
                candidates.push(HistoryCandidate {
                    coin_id,
                    name,
                    symbol,
                    price,
                    market_cap,
                    change_24h,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(candidates)
    } else {
        Err(Error::ValidationFailed(errors))
    }
}

fn required_string(
    fields: &Map<String, Value>,
    key: &str,
    index: usize,
    errors: &mut Vec<String>,
) -> Option<String> {
    match fields.get(key).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Some(value.to_string()),
        _ => {
            errors.push(format!(
                "Item {}: {} is required and must be a string",
                index, key
            ));
            None
        }
    }
}
