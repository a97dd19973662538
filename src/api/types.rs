use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::models::AssetQuote;
use crate::error::{Result, Error};

/// One row of CoinGecko's `/coins/markets` response. Fields we don't use are
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinGeckoMarket {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
}

impl CoinGeckoMarket {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::UpstreamUnavailable("Malformed payload: empty coin id".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(Error::UpstreamUnavailable(format!(
                "Malformed payload: empty symbol for {}", self.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::UpstreamUnavailable(format!(
                "Malformed payload: empty name for {}", self.id
            )));
        }

        match self.current_price {
            Some(price) if price.is_finite() && price >= 0.0 => {}
            Some(price) => {
                return Err(Error::UpstreamUnavailable(format!(
                    "Malformed payload: invalid price {} for {}", price, self.id
                )));
            }
            None => {
                return Err(Error::UpstreamUnavailable(format!(
                    "Malformed payload: missing price for {}", self.id
                )));
            }
        }

        if let Some(cap) = self.market_cap {
            if !cap.is_finite() || cap < 0.0 {
                return Err(Error::UpstreamUnavailable(format!(
                    "Malformed payload: invalid market cap {} for {}", cap, self.id
                )));
            }
        }
        Ok(())
    }

    pub fn into_quote(self, observed_at: DateTime<Utc>) -> Result<AssetQuote> {
        self.validate()?;

        Ok(AssetQuote {
            price: self.current_price.unwrap_or_default(),
            coin_id: self.id,
            name: self.name,
            symbol: self.symbol,
            market_cap: self.market_cap,
            change_24h: self.price_change_percentage_24h.filter(|c| c.is_finite()),
            observed_at,
        })
    }
}
