//! Test fixtures shared across module tests

use crate::config::{AssetConfig, Config, PriceConfig};
use crate::error::{BotError, Result};
use crate::ledger::Ledger;
use crate::price::{PriceCache, PriceSource};
use crate::storage::Database;
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Price source whose quotes and failures are set by the test
#[derive(Default)]
pub struct ScriptedPrices {
    prices: RwLock<HashMap<String, Decimal>>,
    failing: AtomicBool,
    delay: RwLock<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedPrices {
    pub fn new(prices: &[(&str, Decimal)]) -> Arc<Self> {
        let source = Self::default();
        for (symbol, price) in prices {
            source.set(symbol, *price);
        }
        Arc::new(source)
    }

    pub fn set(&self, symbol: &str, price: Decimal) {
        self.prices.write().insert(symbol.to_string(), price);
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedPrices {
    async fn fetch_prices(&self, assets: &[AssetConfig]) -> Result<HashMap<String, Decimal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(BotError::Api("scripted outage".into()));
        }

        let prices = self.prices.read();
        Ok(assets
            .iter()
            .filter_map(|a| prices.get(&a.symbol).map(|p| (a.symbol.clone(), *p)))
            .collect())
    }
}

pub fn test_assets() -> Vec<AssetConfig> {
    vec![
        AssetConfig::new("BTC", "bitcoin"),
        AssetConfig::new("ETH", "ethereum"),
        AssetConfig::new("SOL", "solana"),
    ]
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.prices = PriceConfig {
        assets: test_assets(),
        ..PriceConfig::default()
    };
    config.telegram.admin_ids = vec![1];
    config
}

/// Cache that expires after 50ms and retries upstream immediately
pub fn fast_cache(source: Arc<ScriptedPrices>) -> PriceCache {
    PriceCache::new(source, &test_config().prices)
        .with_timings(Duration::from_millis(50), Duration::ZERO)
}

pub async fn temp_database() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bot.db");
    let db = Database::connect(path.to_str().unwrap()).await.unwrap();
    (dir, db)
}

/// Database, ledger and price cache wired together
pub struct Harness {
    pub _dir: TempDir,
    pub config: Config,
    pub db: Database,
    pub ledger: Arc<Ledger>,
    pub source: Arc<ScriptedPrices>,
    pub prices: Arc<PriceCache>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let (dir, db) = temp_database().await;
        let source = ScriptedPrices::new(&[
            ("BTC", Decimal::new(50_000, 0)),
            ("ETH", Decimal::new(3_000, 0)),
            ("SOL", Decimal::new(150, 0)),
        ]);
        let prices = Arc::new(
            PriceCache::new(source.clone(), &config.prices)
                .with_timings(Duration::from_millis(50), Duration::ZERO),
        );
        let ledger = Arc::new(Ledger::new(db.clone(), config.economy.starting_balance));

        Self {
            _dir: dir,
            config,
            db,
            ledger,
            source,
            prices,
        }
    }

    /// Change a price and wait out the cache TTL so the next read sees it
    pub async fn move_price(&self, symbol: &str, price: Decimal) {
        self.source.set(symbol, price);
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    pub async fn register(&self, user_id: i64) {
        self.ledger.open_account(user_id, None).await.unwrap();
    }
}
