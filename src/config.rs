//! Configuration
//!
//! Loaded from an optional TOML file, then `FAKECRYPTO__SECTION__KEY`
//! environment variables, then a handful of well-known variables
//! (`BOT_TOKEN`, `ADMIN_IDS`, `DATABASE_PATH`, `COINGECKO_API_KEY`).

use crate::error::{BotError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub database: DatabaseConfig,
    pub prices: PriceConfig,
    pub economy: EconomyConfig,
    pub games: GamesConfig,
    pub cooldowns: CooldownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub admin_ids: Vec<i64>,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_command_timeout() -> u64 {
    20
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_url: default_telegram_api_url(),
            poll_timeout_secs: default_poll_timeout(),
            command_timeout_secs: default_command_timeout(),
            admin_ids: Vec::new(),
        }
    }
}

impl TelegramConfig {
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/fake_crypto.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

/// A tradeable asset: ticker symbol and its CoinGecko id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub coin_id: String,
}

impl AssetConfig {
    pub fn new(symbol: &str, coin_id: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            coin_id: coin_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    pub base_url: String,
    /// CoinGecko Pro API key, sent as `x-cg-pro-api-key`
    pub api_key: Option<String>,
    pub cache_ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Minimum wait after a failed fetch before trying upstream again
    pub retry_backoff_secs: u64,
    pub assets: Vec<AssetConfig>,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key: None,
            cache_ttl_secs: 15,
            refresh_interval_secs: 30,
            request_timeout_secs: 10,
            retry_backoff_secs: 5,
            assets: default_assets(),
        }
    }
}

fn default_assets() -> Vec<AssetConfig> {
    [
        ("BTC", "bitcoin"),
        ("ETH", "ethereum"),
        ("SOL", "solana"),
        ("ADA", "cardano"),
        ("DOT", "polkadot"),
        ("AVAX", "avalanche-2"),
        ("MATIC", "matic-network"),
        ("LINK", "chainlink"),
        ("UNI", "uniswap"),
        ("ATOM", "cosmos"),
        ("XRP", "ripple"),
        ("LTC", "litecoin"),
        ("BCH", "bitcoin-cash"),
        ("XLM", "stellar"),
        ("VET", "vechain"),
    ]
    .iter()
    .map(|(symbol, id)| AssetConfig::new(symbol, id))
    .collect()
}

impl PriceConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.assets.iter().map(|a| a.symbol.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub starting_balance: Decimal,
    pub min_bet: Decimal,
    /// Largest bet as a fraction of the current balance
    pub max_bet_fraction: Decimal,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_balance: dec!(10000),
            min_bet: dec!(1),
            max_bet_fraction: dec!(0.5),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GamesConfig {
    pub coinflip: CoinFlipConfig,
    pub slots: SlotsConfig,
    pub dice: DiceConfig,
    pub prediction: PredictionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinFlipConfig {
    pub win_probability: f64,
    pub payout_multiplier: Decimal,
}

impl Default for CoinFlipConfig {
    fn default() -> Self {
        Self {
            win_probability: 0.5,
            payout_multiplier: dec!(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotJackpot {
    pub symbol: String,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotsConfig {
    pub symbols: Vec<String>,
    /// Three-of-a-kind multipliers for specific symbols
    pub jackpots: Vec<SlotJackpot>,
    pub three_match: Decimal,
    pub two_match: Decimal,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            symbols: ["🍒", "🍋", "🍊", "🍇", "🔔", "💎", "7️⃣"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            jackpots: vec![
                SlotJackpot {
                    symbol: "💎".to_string(),
                    multiplier: dec!(50),
                },
                SlotJackpot {
                    symbol: "7️⃣".to_string(),
                    multiplier: dec!(25),
                },
            ],
            three_match: dec!(10),
            two_match: dec!(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceTier {
    pub min_roll: u8,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceConfig {
    pub tiers: Vec<DiceTier>,
}

impl Default for DiceConfig {
    fn default() -> Self {
        let tier = |min_roll, multiplier| DiceTier { min_roll, multiplier };
        Self {
            tiers: vec![
                tier(95, dec!(10)),
                tier(85, dec!(5)),
                tier(70, dec!(3)),
                tier(50, dec!(2)),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub settle_delay_secs: u64,
    pub payout_multiplier: Decimal,
    pub poll_interval_secs: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 300,
            payout_multiplier: dec!(2),
            poll_interval_secs: 5,
        }
    }
}

/// Per-command cooldowns in seconds, keyed by command name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CooldownConfig(pub HashMap<String, u64>);

impl Default for CooldownConfig {
    fn default() -> Self {
        Self(
            [
                ("buy", 3),
                ("sell", 3),
                ("coinflip", 2),
                ("slots", 3),
                ("predict", 5),
                ("roll", 2),
            ]
            .iter()
            .map(|(cmd, secs)| (cmd.to_string(), *secs))
            .collect(),
        )
    }
}

impl CooldownConfig {
    pub fn get(&self, command: &str) -> Option<Duration> {
        self.0
            .get(command)
            .filter(|secs| **secs > 0)
            .map(|secs| Duration::from_secs(*secs))
    }
}

impl Config {
    /// Load config from file and environment
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = ::config::Config::builder()
            .add_source(::config::File::new(path, ::config::FileFormat::Toml).required(false))
            .add_source(
                ::config::Environment::with_prefix("FAKECRYPTO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.database.path = shellexpand::tilde(&config.database.path).into_owned();
        config.validate()?;

        tracing::debug!(
            "Loaded config: {} assets, {} admins",
            config.prices.assets.len(),
            config.telegram.admin_ids.len()
        );
        Ok(config)
    }

    /// Apply the well-known deployment variables on top of the layered config
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(ids) = lookup("ADMIN_IDS") {
            let parsed: Vec<i64> = ids
                .split(',')
                .filter_map(|id| id.trim().parse().ok())
                .collect();
            if !parsed.is_empty() {
                self.telegram.admin_ids = parsed;
            }
        }
        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.is_empty()) {
            self.database.path = path;
        }
        if let Some(key) = lookup("COINGECKO_API_KEY").filter(|k| !k.is_empty()) {
            self.prices.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(BotError::Config(::config::ConfigError::Message(msg.to_string())));

        if self.prices.assets.is_empty() {
            return invalid("prices.assets must not be empty");
        }
        if self.prices.cache_ttl_secs == 0 {
            return invalid("prices.cache_ttl_secs must be positive");
        }
        if self.economy.starting_balance <= Decimal::ZERO {
            return invalid("economy.starting_balance must be positive");
        }
        if self.economy.min_bet <= Decimal::ZERO {
            return invalid("economy.min_bet must be positive");
        }
        if self.economy.max_bet_fraction <= Decimal::ZERO
            || self.economy.max_bet_fraction > Decimal::ONE
        {
            return invalid("economy.max_bet_fraction must be in (0, 1]");
        }
        if !(0.0..=1.0).contains(&self.games.coinflip.win_probability) {
            return invalid("games.coinflip.win_probability must be in [0, 1]");
        }
        if self.games.slots.symbols.is_empty() {
            return invalid("games.slots.symbols must not be empty");
        }
        if self.games.dice.tiers.iter().any(|t| t.min_roll == 0 || t.min_roll > 100) {
            return invalid("games.dice.tiers min_roll must be within 1..=100");
        }
        if self.games.prediction.settle_delay_secs == 0 {
            return invalid("games.prediction.settle_delay_secs must be positive");
        }
        if self.games.prediction.poll_interval_secs == 0 || self.prices.refresh_interval_secs == 0 {
            return invalid("poll and refresh intervals must be positive");
        }
        Ok(())
    }
}
