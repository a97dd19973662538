use crate::api::types::CoinGeckoMarket;
use crate::api::QuoteProvider;
use crate::config::UpstreamConfig;
use crate::error::{Result, Error};
use crate::models::AssetQuote;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, warn};
use reqwest::{Client, StatusCode};
use std::collections::HashSet;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const API_KEY_HEADER: &str = "x-cg-pro-api-key";

/// Fetches the top markets by capitalisation from CoinGecko's
/// `/coins/markets` endpoint.
///
/// No retry and no timeout beyond reqwest's defaults.
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    vs_currency: String,
    per_page: u32,
}

impl CoinGeckoClient {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            vs_currency: config.vs_currency.clone(),
            per_page: config.per_page,
        }
    }

    pub fn markets_url(&self) -> String {
        format!("{}/coins/markets", self.base_url)
    }

    async fn request_markets(&self) -> Result<Vec<CoinGeckoMarket>> {
        let per_page = self.per_page.to_string();
        let mut request = self.client.get(self.markets_url()).query(&[
            ("vs_currency", self.vs_currency.as_str()),
            ("order", "market_cap_desc"),
            ("per_page", per_page.as_str()),
            ("page", "1"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;

        match response.status() {
            status if status.is_success() => match response.json::<Vec<CoinGeckoMarket>>().await {
                Ok(markets) => Ok(markets),
                Err(e) => {
                    error!("Failed to parse CoinGecko response: {}", e);
                    Err(Error::UpstreamUnavailable(format!("Malformed payload: {}", e)))
                }
            },
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("CoinGecko rate limit hit");
                Err(Error::UpstreamUnavailable("CoinGecko API rate limit exceeded".into()))
            }
            status => {
                let error_msg = format!("CoinGecko request failed with status: {}", status);
                error!("{}", error_msg);
                Err(Error::UpstreamUnavailable(error_msg))
            }
        }
    }
}

#[async_trait]
impl QuoteProvider for CoinGeckoClient {
    async fn fetch_quotes(&self) -> Result<Vec<AssetQuote>> {
        let markets = self.request_markets().await?;
        let observed_at = Utc::now();

        let mut seen = HashSet::with_capacity(markets.len());
        let mut quotes = Vec::with_capacity(markets.len());
        for market in markets {
            if !seen.insert(market.id.clone()) {
                warn!("Dropping duplicate CoinGecko row for {}", market.id);
                continue;
            }
            quotes.push(market.into_quote(observed_at)?);
        }

        debug!("Fetched {} quotes from CoinGecko", quotes.len());
        Ok(quotes)
    }
}
