//! Game engine: coin flip, slots, dice and price predictions
//!
//! Immediate games settle in a single ledger transaction. Predictions are
//! opened here and closed later by [`scheduler`] once `settle_at` passes.

pub mod outcomes;
pub mod scheduler;

#[cfg(test)]
mod tests;

use crate::config::{EconomyConfig, GamesConfig};
use crate::error::{BotError, Result};
use crate::ledger::{Ledger, NewRound, RoundReceipt, RoundResolution, CASH_DP};
use crate::price::PriceCache;
use crate::storage::to_millis;
use crate::types::{Direction, GameKind, GameRound, PredictionDetails, RoundStatus, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

pub use outcomes::CoinSide;
pub use scheduler::{Notifier, SettlementScheduler};

/// What the player saw
#[derive(Debug, Clone, PartialEq)]
pub enum GameDetail {
    CoinFlip(CoinSide),
    Slots([String; 3]),
    Dice(u8),
}

/// Outcome of an immediately settled round
#[derive(Debug, Clone)]
pub struct GameResult {
    pub round: GameRound,
    pub balance: Decimal,
    pub multiplier: Decimal,
    pub detail: GameDetail,
}

impl GameResult {
    pub fn won(&self) -> bool {
        self.round.status == RoundStatus::Won
    }
}

/// A placed prediction
#[derive(Debug, Clone)]
pub struct PredictionTicket {
    pub round: GameRound,
    pub balance: Decimal,
    pub start_price: Decimal,
    pub settle_at: DateTime<Utc>,
    pub price_stale: bool,
}

pub struct GameEngine {
    ledger: Arc<Ledger>,
    prices: Arc<PriceCache>,
    games: GamesConfig,
    economy: EconomyConfig,
    rng: Mutex<StdRng>,
}

impl GameEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        prices: Arc<PriceCache>,
        games: GamesConfig,
        economy: EconomyConfig,
    ) -> Self {
        Self::from_rng(ledger, prices, games, economy, StdRng::from_os_rng())
    }

    /// Engine with a fixed seed, so the sequence of outcomes is reproducible
    pub fn with_rng(
        ledger: Arc<Ledger>,
        prices: Arc<PriceCache>,
        games: GamesConfig,
        economy: EconomyConfig,
        seed: u64,
    ) -> Self {
        Self::from_rng(ledger, prices, games, economy, StdRng::seed_from_u64(seed))
    }

    fn from_rng(
        ledger: Arc<Ledger>,
        prices: Arc<PriceCache>,
        games: GamesConfig,
        economy: EconomyConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            ledger,
            prices,
            games,
            economy,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &GamesConfig {
        &self.games
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Round the bet to cents and check it against the limits and balance
    async fn validate_bet(&self, user_id: UserId, bet: Decimal) -> Result<Decimal> {
        let bet = bet.round_dp(CASH_DP);
        if bet < self.economy.min_bet {
            return Err(BotError::Validation(format!(
                "minimum bet is ${}",
                self.economy.min_bet
            )));
        }

        let user = self.ledger.user(user_id).await?;
        if bet > user.balance {
            return Err(BotError::InsufficientFunds {
                needed: bet,
                available: user.balance,
            });
        }

        let max_bet = (user.balance * self.economy.max_bet_fraction).round_dp(CASH_DP);
        if bet > max_bet {
            return Err(BotError::Validation(format!(
                "maximum bet right now is ${}",
                max_bet
            )));
        }
        Ok(bet)
    }

    fn payout(bet: Decimal, multiplier: Decimal) -> Decimal {
        (bet * multiplier).round_dp(CASH_DP)
    }

    async fn settle(
        &self,
        user_id: UserId,
        game: GameKind,
        bet: Decimal,
        multiplier: Decimal,
        outcome: String,
        detail: GameDetail,
    ) -> Result<GameResult> {
        let payout = Self::payout(bet, multiplier);
        let status = if payout > Decimal::ZERO {
            RoundStatus::Won
        } else {
            RoundStatus::Lost
        };

        let receipt = self
            .ledger
            .settle_round(NewRound {
                user_id,
                game,
                bet,
                payout,
                status,
                outcome,
                prediction: None,
            })
            .await?;

        Ok(GameResult {
            round: receipt.round,
            balance: receipt.balance,
            multiplier,
            detail,
        })
    }

    pub async fn coin_flip(&self, user_id: UserId, bet: Decimal) -> Result<GameResult> {
        let bet = self.validate_bet(user_id, bet).await?;
        let side = outcomes::flip(&mut *self.rng.lock(), &self.games.coinflip);

        let multiplier = match side {
            CoinSide::Heads => self.games.coinflip.payout_multiplier,
            CoinSide::Tails => Decimal::ZERO,
        };
        self.settle(
            user_id,
            GameKind::CoinFlip,
            bet,
            multiplier,
            side.as_str().to_string(),
            GameDetail::CoinFlip(side),
        )
        .await
    }

    pub async fn slots(&self, user_id: UserId, bet: Decimal) -> Result<GameResult> {
        let bet = self.validate_bet(user_id, bet).await?;
        let reels = outcomes::spin(&mut *self.rng.lock(), &self.games.slots);
        let multiplier = outcomes::slot_multiplier(&reels, &self.games.slots);

        self.settle(
            user_id,
            GameKind::Slots,
            bet,
            multiplier,
            reels.join(" | "),
            GameDetail::Slots(reels),
        )
        .await
    }

    pub async fn roll_dice(&self, user_id: UserId, bet: Decimal) -> Result<GameResult> {
        let bet = self.validate_bet(user_id, bet).await?;
        let roll = outcomes::roll(&mut *self.rng.lock());
        let multiplier = outcomes::dice_multiplier(roll, &self.games.dice);

        self.settle(
            user_id,
            GameKind::Dice,
            bet,
            multiplier,
            format!("{}/100", roll),
            GameDetail::Dice(roll),
        )
        .await
    }

    /// Take the bet now and record the start price; settlement happens
    /// `settle_delay_secs` later
    pub async fn place_prediction(
        &self,
        user_id: UserId,
        chat_id: i64,
        symbol: &str,
        direction: Direction,
        bet: Decimal,
    ) -> Result<PredictionTicket> {
        let symbol = self.prices.resolve_symbol(symbol)?;
        let bet = self.validate_bet(user_id, bet).await?;
        let quote = self.prices.get_price(&symbol).await?;

        let delay = chrono::Duration::seconds(self.games.prediction.settle_delay_secs as i64);
        let settle_at = Utc::now() + delay;

        let receipt = self
            .ledger
            .open_round(NewRound {
                user_id,
                game: GameKind::Prediction,
                bet,
                payout: Decimal::ZERO,
                status: RoundStatus::Pending,
                outcome: format!("{} {} from {}", symbol, direction.as_str(), quote.price),
                prediction: Some(PredictionDetails {
                    symbol,
                    direction,
                    start_price: quote.price,
                    end_price: None,
                    settle_at,
                    chat_id,
                }),
            })
            .await?;

        Ok(PredictionTicket {
            round: receipt.round,
            balance: receipt.balance,
            start_price: quote.price,
            settle_at,
            price_stale: quote.stale,
        })
    }

    /// Settle one prediction against the current price. Returns `None` if
    /// the round was already resolved.
    pub async fn resolve_prediction(&self, round_id: &str) -> Result<Option<RoundReceipt>> {
        let round = self
            .ledger
            .database()
            .get_round(round_id)
            .await?
            .ok_or_else(|| BotError::RoundNotFound(round_id.to_string()))?;
        if round.status.is_final() {
            return Ok(None);
        }
        let prediction = round
            .prediction
            .as_ref()
            .ok_or_else(|| BotError::Internal(format!("round {} has no prediction", round_id)))?;

        // A quote fetched before the bet cannot settle it
        let quote = match self.prices.get_price(&prediction.symbol).await {
            Ok(quote) if to_millis(quote.fetched_at) <= to_millis(round.created_at) => {
                Err(BotError::UpstreamUnavailable(format!(
                    "no {} price fetched since the bet",
                    prediction.symbol
                )))
            }
            other => other,
        };

        let resolution = match quote {
            Ok(quote) => {
                let hit = prediction.direction.is_hit(prediction.start_price, quote.price);
                let payout = if hit {
                    Self::payout(round.bet, self.games.prediction.payout_multiplier)
                } else {
                    Decimal::ZERO
                };
                RoundResolution {
                    status: if hit { RoundStatus::Won } else { RoundStatus::Lost },
                    payout,
                    end_price: Some(quote.price),
                    outcome: format!(
                        "{} {} {} -> {}",
                        prediction.symbol,
                        prediction.direction.as_str(),
                        prediction.start_price,
                        quote.price
                    ),
                }
            }
            Err(BotError::UpstreamUnavailable(reason)) | Err(BotError::UnsupportedAsset(reason)) => {
                warn!(
                    "Refunding prediction {}: no price for {} ({})",
                    round_id, prediction.symbol, reason
                );
                RoundResolution {
                    status: RoundStatus::Refunded,
                    payout: round.bet,
                    end_price: None,
                    outcome: format!("{} refunded, price unavailable", prediction.symbol),
                }
            }
            Err(e) => return Err(e),
        };

        self.ledger.close_round(round_id, resolution).await
    }

    /// Settle every prediction due at `now`
    pub async fn resolve_due(&self, now: DateTime<Utc>) -> Result<Vec<RoundReceipt>> {
        let due = self.ledger.database().due_rounds(now, 100).await?;
        let mut settled = Vec::with_capacity(due.len());

        for round in due {
            match self.resolve_prediction(&round.id).await {
                Ok(Some(receipt)) => settled.push(receipt),
                Ok(None) => {}
                Err(e) => warn!("Failed to settle prediction {}: {}", round.id, e),
            }
        }

        if !settled.is_empty() {
            info!("Settled {} predictions", settled.len());
        }
        Ok(settled)
    }
}
