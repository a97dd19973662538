use crate::error::Result;
use crate::models::AssetQuote;
use async_trait::async_trait;

pub mod coingecko;
pub mod types;

pub use coingecko::CoinGeckoClient;

/// A read-only source of the tracked asset quotes.
///
/// Any network error, non-2xx response or malformed payload is reported as
/// `Error::UpstreamUnavailable`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_quotes(&self) -> Result<Vec<AssetQuote>>;
}
