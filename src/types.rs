//! Core domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BotError;

/// Telegram user id
pub type UserId = i64;

/// A player account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub balance: Decimal,
    pub total_trades: i64,
    pub total_rounds: i64,
    pub wagered: Decimal,
    pub paid_out: Decimal,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl User {
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("User {}", self.user_id),
        }
    }
}

/// Quantity of an asset owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub user_id: UserId,
    pub symbol: String,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl FromStr for TradeSide {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(BotError::Internal(format!("unknown trade side {}", other))),
        }
    }
}

/// Executed buy or sell, append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub user_id: UserId,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Cash that left (buy) or entered (sell) the balance
    pub total_value: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Signed cash flow of this trade
    pub fn cash_flow(&self) -> Decimal {
        match self.side {
            TradeSide::Buy => -self.total_value,
            TradeSide::Sell => self.total_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    CoinFlip,
    Slots,
    Prediction,
    Dice,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::CoinFlip => "coinflip",
            GameKind::Slots => "slots",
            GameKind::Prediction => "prediction",
            GameKind::Dice => "dice",
        }
    }
}

impl FromStr for GameKind {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coinflip" => Ok(GameKind::CoinFlip),
            "slots" => Ok(GameKind::Slots),
            "prediction" => Ok(GameKind::Prediction),
            "dice" => Ok(GameKind::Dice),
            other => Err(BotError::Internal(format!("unknown game kind {}", other))),
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Pending,
    Won,
    Lost,
    Refunded,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Pending => "pending",
            RoundStatus::Won => "won",
            RoundStatus::Lost => "lost",
            RoundStatus::Refunded => "refunded",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, RoundStatus::Pending)
    }
}

impl FromStr for RoundStatus {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RoundStatus::Pending),
            "won" => Ok(RoundStatus::Won),
            "lost" => Ok(RoundStatus::Lost),
            "refunded" => Ok(RoundStatus::Refunded),
            other => Err(BotError::Internal(format!("unknown round status {}", other))),
        }
    }
}

/// Price direction guessed in a prediction round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }

    /// Whether the move from `start` to `end` matches this direction.
    /// An unchanged price matches neither.
    pub fn is_hit(&self, start: Decimal, end: Decimal) -> bool {
        match self {
            Direction::Up => end > start,
            Direction::Down => end < start,
        }
    }
}

impl FromStr for Direction {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            _ => Err(BotError::Validation("Direction must be UP or DOWN".into())),
        }
    }
}

/// Prediction-specific fields of a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionDetails {
    pub symbol: String,
    pub direction: Direction,
    pub start_price: Decimal,
    pub end_price: Option<Decimal>,
    pub settle_at: DateTime<Utc>,
    /// Chat the result is announced in
    pub chat_id: i64,
}

/// One play of a game, append-only except for prediction resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRound {
    pub id: String,
    pub user_id: UserId,
    pub game: GameKind,
    pub bet: Decimal,
    /// Gross amount credited back, zero on a loss
    pub payout: Decimal,
    pub status: RoundStatus,
    pub outcome: String,
    pub prediction: Option<PredictionDetails>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl GameRound {
    /// Net effect on the user's balance so far
    pub fn net(&self) -> Decimal {
        self.payout - self.bet
    }
}

/// Cached price of one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Price served to callers; `stale` is set when the cache could not be
/// refreshed and the last known value is returned instead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}
