//! Price feed cache
//!
//! Serves prices for the configured assets from memory. A refresh fetches
//! every asset in one upstream call; concurrent refreshes are coalesced
//! behind a single lock. When upstream fails the last known price is served
//! with `stale = true`.

pub mod coingecko;


pub use coingecko::CoinGeckoSource;

use crate::config::{AssetConfig, PriceConfig};
use crate::error::{BotError, Result};
use crate::types::{PriceQuote, PriceSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upstream price provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current USD prices keyed by ticker symbol. Assets the provider does
    /// not know may be missing from the result.
    async fn fetch_prices(&self, assets: &[AssetConfig]) -> Result<HashMap<String, Decimal>>;
}

#[derive(Debug, Default)]
struct RefreshState {
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<Instant>,
    last_error: Option<String>,
}

/// Cache health for admin inspection
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatus {
    pub cached_assets: usize,
    pub total_assets: usize,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub struct PriceCache {
    source: Arc<dyn PriceSource>,
    assets: Vec<AssetConfig>,
    ttl: Duration,
    request_timeout: Duration,
    retry_backoff: Duration,
    entries: RwLock<HashMap<String, PriceSnapshot>>,
    state: RwLock<RefreshState>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl PriceCache {
    pub fn new(source: Arc<dyn PriceSource>, config: &PriceConfig) -> Self {
        Self {
            source,
            assets: config.assets.clone(),
            ttl: config.cache_ttl(),
            request_timeout: config.request_timeout(),
            retry_backoff: config.retry_backoff(),
            entries: RwLock::new(HashMap::new()),
            state: RwLock::new(RefreshState::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Override the cache timings, mainly for tests that cannot wait whole seconds
    pub fn with_timings(mut self, ttl: Duration, retry_backoff: Duration) -> Self {
        self.ttl = ttl;
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn assets(&self) -> &[AssetConfig] {
        &self.assets
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.assets.iter().map(|a| a.symbol.as_str()).collect()
    }

    /// Normalize a user-supplied symbol, rejecting unsupported ones
    pub fn resolve_symbol(&self, symbol: &str) -> Result<String> {
        let symbol = symbol.trim().to_uppercase();
        if self.assets.iter().any(|a| a.symbol == symbol) {
            Ok(symbol)
        } else {
            Err(BotError::UnsupportedAsset(symbol))
        }
    }

    /// Price of one asset, refreshing the cache first if it has expired
    pub async fn get_price(&self, symbol: &str) -> Result<PriceQuote> {
        let symbol = self.resolve_symbol(symbol)?;

        if let Some(quote) = self.cached_quote(&symbol).filter(|q| !q.stale) {
            debug!("Price cache hit for {}", symbol);
            return Ok(quote);
        }

        self.refresh().await;

        self.cached_quote(&symbol).ok_or_else(|| {
            BotError::UpstreamUnavailable(format!("no price has been fetched for {}", symbol))
        })
    }

    /// Prices of every configured asset that has ever been fetched, in
    /// configuration order
    pub async fn all_prices(&self) -> Result<Vec<PriceQuote>> {
        if self.needs_refresh() {
            self.refresh().await;
        }

        let quotes: Vec<PriceQuote> = self
            .assets
            .iter()
            .filter_map(|a| self.cached_quote(&a.symbol))
            .collect();

        if quotes.is_empty() {
            return Err(BotError::UpstreamUnavailable(
                "no prices have been fetched yet".into(),
            ));
        }
        Ok(quotes)
    }

    /// Last known prices without touching upstream
    pub fn snapshot(&self) -> HashMap<String, Decimal> {
        self.entries
            .read()
            .values()
            .map(|s| (s.symbol.clone(), s.price))
            .collect()
    }

    pub fn status(&self) -> CacheStatus {
        let state = self.state.read();
        CacheStatus {
            cached_assets: self.entries.read().len(),
            total_assets: self.assets.len(),
            last_success: state.last_success,
            last_error: state.last_error.clone(),
        }
    }

    /// Fetch from upstream unless another caller just did. Failures are
    /// recorded and logged, never returned: callers fall back to the
    /// cached values.
    pub async fn refresh(&self) {
        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited for the lock
        if !self.needs_refresh() {
            return;
        }
        let last_failure = self.state.read().last_failure;
        if let Some(failed_at) = last_failure {
            if failed_at.elapsed() < self.retry_backoff {
                debug!("Skipping price refresh, upstream failed {:?} ago", failed_at.elapsed());
                return;
            }
        }

        let fetch = self.source.fetch_prices(&self.assets);
        match tokio::time::timeout(self.request_timeout, fetch).await {
            Ok(Ok(prices)) => self.store(prices),
            Ok(Err(e)) => self.record_failure(e.to_string()),
            Err(_) => self.record_failure(format!(
                "price fetch timed out after {:?}",
                self.request_timeout
            )),
        }
    }

    fn needs_refresh(&self) -> bool {
        match self.state.read().last_success {
            Some(at) => age(at) >= self.ttl,
            None => true,
        }
    }

    fn cached_quote(&self, symbol: &str) -> Option<PriceQuote> {
        self.entries.read().get(symbol).map(|s| PriceQuote {
            symbol: s.symbol.clone(),
            price: s.price,
            fetched_at: s.fetched_at,
            stale: age(s.fetched_at) >= self.ttl,
        })
    }

    fn store(&self, prices: HashMap<String, Decimal>) {
        let now = Utc::now();
        let count = prices.len();
        {
            let mut entries = self.entries.write();
            for (symbol, price) in prices {
                if !self.assets.iter().any(|a| a.symbol == symbol) {
                    continue;
                }
                entries.insert(
                    symbol.clone(),
                    PriceSnapshot {
                        symbol,
                        price,
                        fetched_at: now,
                    },
                );
            }
        }

        let mut state = self.state.write();
        state.last_success = Some(now);
        state.last_failure = None;
        state.last_error = None;
        info!("Updated {} prices", count);
    }

    fn record_failure(&self, error: String) {
        warn!("Price refresh failed, serving cached prices: {}", error);
        let mut state = self.state.write();
        state.last_failure = Some(Instant::now());
        state.last_error = Some(error);
    }
}

fn age(at: DateTime<Utc>) -> Duration {
    (Utc::now() - at).to_std().unwrap_or(Duration::ZERO)
}

/// Keep the cache warm independent of command traffic
pub async fn run_refresher(cache: Arc<PriceCache>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        cache.refresh().await;
    }
}
