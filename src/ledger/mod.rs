//! Ledger: every change to a balance or holding goes through here
//!
//! Each operation holds the user's async lock for its whole duration and
//! runs in one SQLite transaction. The first statement of every transaction
//! is a write so SQLite takes the write lock before any balance is read.


use crate::error::{BotError, Result};
use crate::storage::{
    from_millis, parse_decimal, to_millis, Counter, Database, RoundRow, UserRow, ROUND_COLUMNS,
    USER_COLUMNS,
};
use crate::types::{
    GameKind, GameRound, PredictionDetails, RoundStatus, Trade, TradeSide, User, UserId,
};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

/// Decimal places kept for asset quantities
pub const QUANTITY_DP: u32 = 10;
/// Decimal places kept for cash
pub const CASH_DP: u32 = 2;

/// Per-user async mutexes
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            if locks.len() > 4096 {
                // Drop locks nobody is holding or waiting on
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks
                .entry(user_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Cash-for-asset exchange
#[derive(Debug, Clone, PartialEq)]
pub enum AssetTransfer {
    /// Spend `cash` on `symbol` at `price`
    Buy {
        user_id: UserId,
        symbol: String,
        cash: Decimal,
        price: Decimal,
    },
    /// Liquidate the whole holding at `price`
    SellAll {
        user_id: UserId,
        symbol: String,
        price: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub trade: Trade,
    pub balance: Decimal,
    /// Quantity held after the trade
    pub holding: Decimal,
}

/// A round to be recorded
#[derive(Debug, Clone, PartialEq)]
pub struct NewRound {
    pub user_id: UserId,
    pub game: GameKind,
    pub bet: Decimal,
    pub payout: Decimal,
    pub status: RoundStatus,
    pub outcome: String,
    pub prediction: Option<PredictionDetails>,
}

/// Final state of a pending round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResolution {
    pub status: RoundStatus,
    pub payout: Decimal,
    pub end_price: Option<Decimal>,
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundReceipt {
    pub round: GameRound,
    pub balance: Decimal,
}

pub struct Ledger {
    db: Database,
    starting_balance: Decimal,
    locks: UserLocks,
}

impl Ledger {
    pub fn new(db: Database, starting_balance: Decimal) -> Self {
        Self {
            db,
            starting_balance,
            locks: UserLocks::default(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn starting_balance(&self) -> Decimal {
        self.starting_balance
    }

    /// Create the account if it does not exist. Returns the account and
    /// whether it was created by this call.
    pub async fn open_account(
        &self,
        user_id: UserId,
        display_name: Option<&str>,
    ) -> Result<(User, bool)> {
        let _guard = self.locks.acquire(user_id).await;
        let now = to_millis(Utc::now());
        let mut tx = self.db.pool().begin().await?;

        let created = sqlx::query(
            "INSERT OR IGNORE INTO users (user_id, display_name, balance, created_at, last_active) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(display_name)
        .bind(self.starting_balance.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if created {
            bump_counter(&mut tx, Counter::TotalUsers, Decimal::ONE).await?;
            bump_counter(&mut tx, Counter::CirculatingCash, self.starting_balance).await?;
            info!("Opened account for user {} with {}", user_id, self.starting_balance);
        } else {
            sqlx::query(
                "UPDATE users SET display_name = COALESCE(?, display_name), last_active = ? \
                 WHERE user_id = ?",
            )
            .bind(display_name)
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        let user = load_user(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok((user, created))
    }

    /// Record activity for a registered user. Unknown users are ignored.
    pub async fn touch(&self, user_id: UserId) -> Result<bool> {
        let updated = sqlx::query("UPDATE users SET last_active = ? WHERE user_id = ?")
            .bind(to_millis(Utc::now()))
            .bind(user_id)
            .execute(self.db.pool())
            .await?
            .rows_affected();
        Ok(updated == 1)
    }

    pub async fn user(&self, user_id: UserId) -> Result<User> {
        self.db
            .get_user(user_id)
            .await?
            .ok_or(BotError::NotRegistered(user_id))
    }

    /// Remove cash from a balance. Returns the new balance.
    pub async fn debit(&self, user_id: UserId, amount: Decimal) -> Result<Decimal> {
        ensure_positive(amount, "debit amount")?;
        let _guard = self.locks.acquire(user_id).await;
        let mut tx = self.db.pool().begin().await?;

        touch_user(&mut tx, user_id).await?;
        let mut user = load_user(&mut tx, user_id).await?;
        apply_cash(&mut tx, &mut user, amount, Decimal::ZERO).await?;
        save_user(&mut tx, &user).await?;

        tx.commit().await?;
        Ok(user.balance)
    }

    /// Add cash to a balance. Returns the new balance.
    pub async fn credit(&self, user_id: UserId, amount: Decimal) -> Result<Decimal> {
        ensure_positive(amount, "credit amount")?;
        let _guard = self.locks.acquire(user_id).await;
        let mut tx = self.db.pool().begin().await?;

        touch_user(&mut tx, user_id).await?;
        let mut user = load_user(&mut tx, user_id).await?;
        apply_cash(&mut tx, &mut user, Decimal::ZERO, amount).await?;
        save_user(&mut tx, &user).await?;

        tx.commit().await?;
        Ok(user.balance)
    }

    /// Exchange cash for an asset or back, recording the trade
    pub async fn transfer_asset(&self, transfer: AssetTransfer) -> Result<TradeReceipt> {
        let (user_id, symbol, price) = match &transfer {
            AssetTransfer::Buy {
                user_id,
                symbol,
                price,
                ..
            }
            | AssetTransfer::SellAll {
                user_id,
                symbol,
                price,
            } => (*user_id, symbol.clone(), *price),
        };
        ensure_positive(price, "price")?;

        let _guard = self.locks.acquire(user_id).await;
        let mut tx = self.db.pool().begin().await?;

        touch_user(&mut tx, user_id).await?;
        let mut user = load_user(&mut tx, user_id).await?;
        let held = load_quantity(&mut tx, user_id, &symbol).await?;

        let (side, quantity, cash, remaining) = match transfer {
            AssetTransfer::Buy { cash, .. } => {
                ensure_positive(cash, "amount")?;
                let quantity = (cash / price).round_dp(QUANTITY_DP);
                if quantity.is_zero() {
                    return Err(BotError::Validation(format!(
                        "{} buys less than the smallest unit of {}",
                        cash, symbol
                    )));
                }
                apply_cash(&mut tx, &mut user, cash, Decimal::ZERO).await?;
                (TradeSide::Buy, quantity, cash, held + quantity)
            }
            AssetTransfer::SellAll { .. } => {
                if held <= Decimal::ZERO {
                    return Err(BotError::NoHolding(symbol));
                }
                let proceeds = (held * price).round_dp(CASH_DP);
                apply_cash(&mut tx, &mut user, Decimal::ZERO, proceeds).await?;
                (TradeSide::Sell, held, proceeds, Decimal::ZERO)
            }
        };

        write_quantity(&mut tx, user_id, &symbol, remaining).await?;
        user.total_trades += 1;
        save_user(&mut tx, &user).await?;

        let now = Utc::now();
        let trade_id = sqlx::query(
            "INSERT INTO trades (user_id, symbol, side, quantity, price, total_value, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&symbol)
        .bind(side.as_str())
        .bind(quantity.to_string())
        .bind(price.to_string())
        .bind(cash.to_string())
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        bump_counter(&mut tx, Counter::TotalTrades, Decimal::ONE).await?;
        bump_counter(&mut tx, Counter::TradeVolume, cash).await?;
        tx.commit().await?;

        info!(
            "User {} {} {} {} @ {} for {}",
            user_id,
            side.as_str(),
            quantity,
            symbol,
            price,
            cash
        );

        Ok(TradeReceipt {
            trade: Trade {
                id: trade_id,
                user_id,
                symbol,
                side,
                quantity,
                price,
                total_value: cash,
                timestamp: from_millis(to_millis(now))?,
            },
            balance: user.balance,
            holding: remaining,
        })
    }

    /// Record an immediately resolved round: the bet debit and the payout
    /// credit are applied together
    pub async fn settle_round(&self, round: NewRound) -> Result<RoundReceipt> {
        if !round.status.is_final() {
            return Err(BotError::Internal("settle_round needs a final status".into()));
        }
        self.record_round(round).await
    }

    /// Record a pending round, debiting the bet. The payout is credited by
    /// [`Ledger::close_round`].
    pub async fn open_round(&self, round: NewRound) -> Result<RoundReceipt> {
        if round.status != RoundStatus::Pending || !round.payout.is_zero() {
            return Err(BotError::Internal("open_round needs a pending round without payout".into()));
        }
        self.record_round(round).await
    }

    async fn record_round(&self, round: NewRound) -> Result<RoundReceipt> {
        ensure_positive(round.bet, "bet")?;
        if round.payout < Decimal::ZERO {
            return Err(BotError::Internal("negative payout".into()));
        }

        let _guard = self.locks.acquire(round.user_id).await;
        let mut tx = self.db.pool().begin().await?;

        touch_user(&mut tx, round.user_id).await?;
        let mut user = load_user(&mut tx, round.user_id).await?;
        apply_cash(&mut tx, &mut user, round.bet, round.payout).await?;
        user.total_rounds += 1;
        user.wagered += round.bet;
        user.paid_out += round.payout;
        save_user(&mut tx, &user).await?;

        let now = from_millis(to_millis(Utc::now()))?;
        let record = GameRound {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: round.user_id,
            game: round.game,
            bet: round.bet,
            payout: round.payout,
            status: round.status,
            outcome: round.outcome,
            prediction: round.prediction,
            created_at: now,
            resolved_at: round.status.is_final().then_some(now),
        };
        insert_round(&mut tx, &record).await?;

        bump_counter(&mut tx, Counter::TotalRounds, Decimal::ONE).await?;
        bump_counter(&mut tx, Counter::TotalWagered, record.bet).await?;
        if !record.payout.is_zero() {
            bump_counter(&mut tx, Counter::TotalPaidOut, record.payout).await?;
        }
        tx.commit().await?;

        debug!(
            "Round {} {} for user {}: bet {} paid {} ({})",
            record.id,
            record.game,
            record.user_id,
            record.bet,
            record.payout,
            record.status.as_str()
        );

        Ok(RoundReceipt {
            round: record,
            balance: user.balance,
        })
    }

    /// Resolve a pending round. Returns `None` when the round was already
    /// resolved, in which case nothing changes.
    pub async fn close_round(
        &self,
        round_id: &str,
        resolution: RoundResolution,
    ) -> Result<Option<RoundReceipt>> {
        if !resolution.status.is_final() || resolution.payout < Decimal::ZERO {
            return Err(BotError::Internal(format!(
                "invalid resolution for round {}",
                round_id
            )));
        }

        let pending = self
            .db
            .get_round(round_id)
            .await?
            .ok_or_else(|| BotError::RoundNotFound(round_id.to_string()))?;
        if pending.status.is_final() {
            return Ok(None);
        }

        let _guard = self.locks.acquire(pending.user_id).await;
        let mut tx = self.db.pool().begin().await?;
        let now = to_millis(Utc::now());

        let updated = sqlx::query(
            "UPDATE game_rounds SET status = ?, payout = ?, outcome = ?, end_price = ?, resolved_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(resolution.status.as_str())
        .bind(resolution.payout.to_string())
        .bind(&resolution.outcome)
        .bind(resolution.end_price.map(|p| p.to_string()))
        .bind(now)
        .bind(round_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            debug!("Round {} already resolved", round_id);
            return Ok(None);
        }

        let mut user = load_user(&mut tx, pending.user_id).await?;
        if !resolution.payout.is_zero() {
            apply_cash(&mut tx, &mut user, Decimal::ZERO, resolution.payout).await?;
            user.paid_out += resolution.payout;
            save_user(&mut tx, &user).await?;
            bump_counter(&mut tx, Counter::TotalPaidOut, resolution.payout).await?;
        }

        let sql = format!("SELECT {} FROM game_rounds WHERE id = ?", ROUND_COLUMNS);
        let round: GameRound = sqlx::query_as::<_, RoundRow>(&sql)
            .bind(round_id)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;
        tx.commit().await?;

        info!(
            "Resolved round {} for user {}: {} (payout {})",
            round_id,
            round.user_id,
            round.status.as_str(),
            round.payout
        );

        Ok(Some(RoundReceipt {
            round,
            balance: user.balance,
        }))
    }
}

fn ensure_positive(value: Decimal, what: &str) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(BotError::Validation(format!("{} must be positive", what)));
    }
    Ok(())
}

/// Mark the user active. Doubles as the transaction's first write.
async fn touch_user(conn: &mut SqliteConnection, user_id: UserId) -> Result<()> {
    let updated = sqlx::query("UPDATE users SET last_active = ? WHERE user_id = ?")
        .bind(to_millis(Utc::now()))
        .bind(user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(BotError::NotRegistered(user_id));
    }
    Ok(())
}

async fn load_user(conn: &mut SqliteConnection, user_id: UserId) -> Result<User> {
    let sql = format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS);
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(BotError::NotRegistered(user_id))?
        .try_into()
}

async fn save_user(conn: &mut SqliteConnection, user: &User) -> Result<()> {
    sqlx::query(
        "UPDATE users SET balance = ?, total_trades = ?, total_rounds = ?, wagered = ?, paid_out = ? \
         WHERE user_id = ?",
    )
    .bind(user.balance.to_string())
    .bind(user.total_trades)
    .bind(user.total_rounds)
    .bind(user.wagered.to_string())
    .bind(user.paid_out.to_string())
    .bind(user.user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Debit then credit the in-memory account, refusing to go negative, and
/// track the circulating cash aggregate. The caller saves the account.
async fn apply_cash(
    conn: &mut SqliteConnection,
    user: &mut User,
    debit: Decimal,
    credit: Decimal,
) -> Result<()> {
    if debit > user.balance {
        return Err(BotError::InsufficientFunds {
            needed: debit,
            available: user.balance,
        });
    }
    user.balance = user.balance - debit + credit;

    let delta = credit - debit;
    if !delta.is_zero() {
        bump_counter(conn, Counter::CirculatingCash, delta).await?;
    }
    Ok(())
}

async fn load_quantity(conn: &mut SqliteConnection, user_id: UserId, symbol: &str) -> Result<Decimal> {
    let quantity: Option<String> =
        sqlx::query_scalar("SELECT quantity FROM holdings WHERE user_id = ? AND symbol = ?")
            .bind(user_id)
            .bind(symbol)
            .fetch_optional(&mut *conn)
            .await?;

    quantity
        .as_deref()
        .map(parse_decimal)
        .transpose()
        .map(|q| q.unwrap_or(Decimal::ZERO))
}

/// Store a holding quantity; zero removes the row
async fn write_quantity(
    conn: &mut SqliteConnection,
    user_id: UserId,
    symbol: &str,
    quantity: Decimal,
) -> Result<()> {
    if quantity.is_zero() {
        sqlx::query("DELETE FROM holdings WHERE user_id = ? AND symbol = ?")
            .bind(user_id)
            .bind(symbol)
            .execute(&mut *conn)
            .await?;
    } else {
        sqlx::query(
            "INSERT INTO holdings (user_id, symbol, quantity) VALUES (?, ?, ?) \
             ON CONFLICT (user_id, symbol) DO UPDATE SET quantity = excluded.quantity",
        )
        .bind(user_id)
        .bind(symbol)
        .bind(quantity.to_string())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_round(conn: &mut SqliteConnection, round: &GameRound) -> Result<()> {
    let prediction = round.prediction.as_ref();
    sqlx::query(
        "INSERT INTO game_rounds (id, user_id, game, bet, payout, status, outcome, symbol, direction, \
         start_price, end_price, settle_at, chat_id, created_at, resolved_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&round.id)
    .bind(round.user_id)
    .bind(round.game.as_str())
    .bind(round.bet.to_string())
    .bind(round.payout.to_string())
    .bind(round.status.as_str())
    .bind(&round.outcome)
    .bind(prediction.map(|p| p.symbol.clone()))
    .bind(prediction.map(|p| p.direction.as_str()))
    .bind(prediction.map(|p| p.start_price.to_string()))
    .bind(prediction.and_then(|p| p.end_price).map(|p| p.to_string()))
    .bind(prediction.map(|p| to_millis(p.settle_at)))
    .bind(prediction.map(|p| p.chat_id))
    .bind(to_millis(round.created_at))
    .bind(round.resolved_at.map(to_millis))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn bump_counter(conn: &mut SqliteConnection, counter: Counter, delta: Decimal) -> Result<()> {
    let current: Option<String> = sqlx::query_scalar("SELECT value FROM counters WHERE name = ?")
        .bind(counter.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    let current = current
        .as_deref()
        .map(parse_decimal)
        .transpose()?
        .unwrap_or(Decimal::ZERO);

    sqlx::query(
        "INSERT INTO counters (name, value) VALUES (?, ?) \
         ON CONFLICT (name) DO UPDATE SET value = excluded.value",
    )
    .bind(counter.as_str())
    .bind((current + delta).to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}
