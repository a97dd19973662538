use crate::models::AssetQuote;
use serde::Deserialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    Price,
    MarketCap,
    #[serde(rename = "change24h")]
    Change24h,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Query string accepted by `GET /api/coins`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinQuery {
    pub search: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort_by: Option<SortBy>,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl CoinQuery {
    pub fn is_empty(&self) -> bool {
        self.search.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.sort_by.is_none()
    }

    fn matches(&self, quote: &AssetQuote) -> bool {
        let matches_search = match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                quote.name.to_lowercase().contains(&term)
                    || quote.symbol.to_lowercase().contains(&term)
            }
            None => true,
        };
        let min = self.min_price.unwrap_or(0.0);
        let max = self.max_price.unwrap_or(f64::INFINITY);

        matches_search && quote.price >= min && quote.price <= max
    }

    /// Filters, then sorts when `sort_by` is set. Without a sort key the
    /// incoming order is kept.
    pub fn apply(&self, quotes: &[AssetQuote]) -> Vec<AssetQuote> {
        let mut selected: Vec<AssetQuote> = quotes
            .iter()
            .filter(|quote| self.matches(quote))
            .cloned()
            .collect();

        if let Some(sort_by) = self.sort_by {
            selected.sort_by(|a, b| {
                let ordering = compare(a, b, sort_by);
                match self.sort_order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }
        selected
    }
}

fn compare(a: &AssetQuote, b: &AssetQuote, sort_by: SortBy) -> Ordering {
    match sort_by {
        SortBy::Price => a.price.total_cmp(&b.price),
        SortBy::MarketCap => a
            .market_cap
            .unwrap_or(0.0)
            .total_cmp(&b.market_cap.unwrap_or(0.0)),
        SortBy::Change24h => a
            .change_24h
            .unwrap_or(0.0)
            .total_cmp(&b.change_24h.unwrap_or(0.0)),
        SortBy::Name => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    }
}
