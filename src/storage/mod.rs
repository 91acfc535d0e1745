//! SQLite persistence
//!
//! Money is stored as decimal TEXT, timestamps as unix milliseconds.
//! Mutations live in [`crate::ledger`]; this module owns the schema and the
//! read queries.


use crate::config::DatabaseConfig;
use crate::error::{BotError, Result};
use crate::types::{GameRound, Holding, PredictionDetails, Trade, User, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        display_name TEXT,
        balance TEXT NOT NULL,
        total_trades INTEGER NOT NULL DEFAULT 0,
        total_rounds INTEGER NOT NULL DEFAULT 0,
        wagered TEXT NOT NULL DEFAULT '0',
        paid_out TEXT NOT NULL DEFAULT '0',
        created_at INTEGER NOT NULL,
        last_active INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_users_last_active ON users (last_active)",
    r#"
    CREATE TABLE IF NOT EXISTS holdings (
        user_id INTEGER NOT NULL REFERENCES users (user_id),
        symbol TEXT NOT NULL,
        quantity TEXT NOT NULL,
        PRIMARY KEY (user_id, symbol)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users (user_id),
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        quantity TEXT NOT NULL,
        price TEXT NOT NULL,
        total_value TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_trades_user ON trades (user_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS game_rounds (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users (user_id),
        game TEXT NOT NULL,
        bet TEXT NOT NULL,
        payout TEXT NOT NULL,
        status TEXT NOT NULL,
        outcome TEXT NOT NULL,
        symbol TEXT,
        direction TEXT,
        start_price TEXT,
        end_price TEXT,
        settle_at INTEGER,
        chat_id INTEGER,
        created_at INTEGER NOT NULL,
        resolved_at INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_rounds_user ON game_rounds (user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_rounds_pending ON game_rounds (status, settle_at)",
    r#"
    CREATE TABLE IF NOT EXISTS counters (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// Bot-wide aggregates maintained alongside every mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    TotalUsers,
    TotalTrades,
    TotalRounds,
    TradeVolume,
    TotalWagered,
    TotalPaidOut,
    CirculatingCash,
}

impl Counter {
    pub const ALL: [Counter; 7] = [
        Counter::TotalUsers,
        Counter::TotalTrades,
        Counter::TotalRounds,
        Counter::TradeVolume,
        Counter::TotalWagered,
        Counter::TotalPaidOut,
        Counter::CirculatingCash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::TotalUsers => "total_users",
            Counter::TotalTrades => "total_trades",
            Counter::TotalRounds => "total_rounds",
            Counter::TradeVolume => "trade_volume",
            Counter::TotalWagered => "total_wagered",
            Counter::TotalPaidOut => "total_paid_out",
            Counter::CirculatingCash => "circulating_cash",
        }
    }
}

/// Snapshot of the counters table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters(HashMap<Counter, Decimal>);

impl Counters {
    pub fn get(&self, counter: Counter) -> Decimal {
        self.0.get(&counter).copied().unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    user_id: i64,
    display_name: Option<String>,
    balance: String,
    total_trades: i64,
    total_rounds: i64,
    wagered: String,
    paid_out: String,
    created_at: i64,
    last_active: i64,
}

impl TryFrom<UserRow> for User {
    type Error = BotError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            user_id: row.user_id,
            display_name: row.display_name,
            balance: parse_decimal(&row.balance)?,
            total_trades: row.total_trades,
            total_rounds: row.total_rounds,
            wagered: parse_decimal(&row.wagered)?,
            paid_out: parse_decimal(&row.paid_out)?,
            created_at: from_millis(row.created_at)?,
            last_active: from_millis(row.last_active)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct HoldingRow {
    user_id: i64,
    symbol: String,
    quantity: String,
}

impl TryFrom<HoldingRow> for Holding {
    type Error = BotError;

    fn try_from(row: HoldingRow) -> Result<Self> {
        Ok(Holding {
            user_id: row.user_id,
            symbol: row.symbol,
            quantity: parse_decimal(&row.quantity)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TradeRow {
    id: i64,
    user_id: i64,
    symbol: String,
    side: String,
    quantity: String,
    price: String,
    total_value: String,
    created_at: i64,
}

impl TryFrom<TradeRow> for Trade {
    type Error = BotError;

    fn try_from(row: TradeRow) -> Result<Self> {
        Ok(Trade {
            id: row.id,
            user_id: row.user_id,
            symbol: row.symbol,
            side: row.side.parse()?,
            quantity: parse_decimal(&row.quantity)?,
            price: parse_decimal(&row.price)?,
            total_value: parse_decimal(&row.total_value)?,
            timestamp: from_millis(row.created_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RoundRow {
    id: String,
    user_id: i64,
    game: String,
    bet: String,
    payout: String,
    status: String,
    outcome: String,
    symbol: Option<String>,
    direction: Option<String>,
    start_price: Option<String>,
    end_price: Option<String>,
    settle_at: Option<i64>,
    chat_id: Option<i64>,
    created_at: i64,
    resolved_at: Option<i64>,
}

impl TryFrom<RoundRow> for GameRound {
    type Error = BotError;

    fn try_from(row: RoundRow) -> Result<Self> {
        let prediction = match (row.symbol, row.direction, row.start_price, row.settle_at) {
            (Some(symbol), Some(direction), Some(start_price), Some(settle_at)) => {
                Some(PredictionDetails {
                    symbol,
                    direction: direction.parse()?,
                    start_price: parse_decimal(&start_price)?,
                    end_price: row.end_price.as_deref().map(parse_decimal).transpose()?,
                    settle_at: from_millis(settle_at)?,
                    chat_id: row.chat_id.unwrap_or(row.user_id),
                })
            }
            _ => None,
        };

        Ok(GameRound {
            id: row.id,
            user_id: row.user_id,
            game: row.game.parse()?,
            bet: parse_decimal(&row.bet)?,
            payout: parse_decimal(&row.payout)?,
            status: row.status.parse()?,
            outcome: row.outcome,
            prediction,
            created_at: from_millis(row.created_at)?,
            resolved_at: row.resolved_at.map(from_millis).transpose()?,
        })
    }
}

pub(crate) const USER_COLUMNS: &str = "user_id, display_name, balance, total_trades, total_rounds, \
     wagered, paid_out, created_at, last_active";

pub(crate) const ROUND_COLUMNS: &str = "id, user_id, game, bet, payout, status, outcome, symbol, \
     direction, start_price, end_price, settle_at, chat_id, created_at, resolved_at";

const TRADE_COLUMNS: &str = "id, user_id, symbol, side, quantity, price, total_value, created_at";

pub(crate) fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|e| BotError::Internal(format!("corrupt decimal {:?}: {}", value, e)))
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| BotError::Internal(format!("timestamp out of range: {}", millis)))
}

/// SQLite-backed store
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `path` with default pool settings
    pub async fn connect(path: &str) -> Result<Self> {
        Self::connect_with(&DatabaseConfig {
            path: path.to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    pub async fn connect_with(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BotError::Internal(format!("cannot create {:?}: {}", parent, e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_millis(config.busy_timeout_ms.max(1_000)))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        info!("Database ready at {}", config.path);
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// Users ranked by cash balance
    pub async fn top_users_by_balance(&self, limit: usize) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY CAST(balance AS REAL) DESC, user_id ASC LIMIT ?",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    pub async fn get_holdings(&self, user_id: UserId) -> Result<Vec<Holding>> {
        sqlx::query_as::<_, HoldingRow>(
            "SELECT user_id, symbol, quantity FROM holdings WHERE user_id = ? ORDER BY symbol",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Holding::try_from)
        .collect()
    }

    pub async fn get_holding(&self, user_id: UserId, symbol: &str) -> Result<Option<Holding>> {
        sqlx::query_as::<_, HoldingRow>(
            "SELECT user_id, symbol, quantity FROM holdings WHERE user_id = ? AND symbol = ?",
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?
        .map(Holding::try_from)
        .transpose()
    }

    pub async fn recent_trades(&self, user_id: UserId, limit: usize) -> Result<Vec<Trade>> {
        let sql = format!(
            "SELECT {} FROM trades WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            TRADE_COLUMNS
        );
        sqlx::query_as::<_, TradeRow>(&sql)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Trade::try_from)
            .collect()
    }

    pub async fn get_round(&self, round_id: &str) -> Result<Option<GameRound>> {
        let sql = format!("SELECT {} FROM game_rounds WHERE id = ?", ROUND_COLUMNS);
        sqlx::query_as::<_, RoundRow>(&sql)
            .bind(round_id)
            .fetch_optional(&self.pool)
            .await?
            .map(GameRound::try_from)
            .transpose()
    }

    pub async fn pending_rounds_for_user(&self, user_id: UserId) -> Result<Vec<GameRound>> {
        let sql = format!(
            "SELECT {} FROM game_rounds WHERE user_id = ? AND status = 'pending' ORDER BY settle_at",
            ROUND_COLUMNS
        );
        sqlx::query_as::<_, RoundRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(GameRound::try_from)
            .collect()
    }

    /// Pending rounds whose settlement time has passed
    pub async fn due_rounds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<GameRound>> {
        let sql = format!(
            "SELECT {} FROM game_rounds WHERE status = 'pending' AND settle_at <= ? \
             ORDER BY settle_at LIMIT ?",
            ROUND_COLUMNS
        );
        sqlx::query_as::<_, RoundRow>(&sql)
            .bind(to_millis(now))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(GameRound::try_from)
            .collect()
    }

    pub async fn counters(&self) -> Result<Counters> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT name, value FROM counters")
            .fetch_all(&self.pool)
            .await?;

        let mut counters = HashMap::new();
        for (name, value) in rows {
            if let Some(counter) = Counter::ALL.iter().find(|c| c.as_str() == name) {
                counters.insert(*counter, parse_decimal(&value)?);
            }
        }
        Ok(Counters(counters))
    }

    /// Users who ran any command since `since`
    pub async fn active_users_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE last_active >= ?")
            .bind(to_millis(since))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
