//! CoinGecko price source
//!
//! Uses the `/simple/price` endpoint, which returns every requested coin in
//! one call: `{"bitcoin": {"usd": 50000.0}, "ethereum": {"usd": 3000.1}}`.

use super::PriceSource;
use crate::config::{AssetConfig, PriceConfig};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// CoinGecko REST client
#[derive(Clone)]
pub struct CoinGeckoSource {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<Decimal>,
}

impl CoinGeckoSource {
    pub fn new(config: &PriceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent("fake-crypto-bot/0.1")
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

/// Map a `/simple/price` response body back to ticker symbols.
/// Coins missing from the response or priced at zero are skipped.
pub fn parse_simple_prices(assets: &[AssetConfig], body: &str) -> Result<HashMap<String, Decimal>> {
    let raw: HashMap<String, SimplePrice> = serde_json::from_str(body)?;

    let prices = assets
        .iter()
        .filter_map(|asset| {
            let price = raw.get(&asset.coin_id)?.usd?;
            (price > Decimal::ZERO).then(|| (asset.symbol.clone(), price))
        })
        .collect();

    Ok(prices)
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn fetch_prices(&self, assets: &[AssetConfig]) -> Result<HashMap<String, Decimal>> {
        let ids = assets
            .iter()
            .map(|a| a.coin_id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/simple/price", self.base_url);

        let mut request = self
            .http
            .get(&url)
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-pro-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Api(format!("CoinGecko error {}: {}", status, body)));
        }

        let body = response.text().await?;
        let prices = parse_simple_prices(assets, &body)?;
        debug!("Fetched {} of {} prices from CoinGecko", prices.len(), assets.len());
        Ok(prices)
    }
}
