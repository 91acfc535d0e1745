//! Error types

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    /// Malformed command arguments
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Unsupported asset: {0}")]
    UnsupportedAsset(String),

    #[error("No holding of {0}")]
    NoHolding(String),

    /// No price could be obtained, not even a stale one
    #[error("Price feed unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Rate limited on /{command}, retry in {retry_after:?}")]
    RateLimited {
        command: String,
        retry_after: Duration,
    },

    #[error("Permission denied")]
    PermissionDenied,

    #[error("User {0} is not registered")]
    NotRegistered(i64),

    #[error("Round not found: {0}")]
    RoundNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Errors caused by the user's request rather than by the bot's
    /// infrastructure. These are answered in chat without error-level logs.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BotError::Validation(_)
                | BotError::InsufficientFunds { .. }
                | BotError::UnsupportedAsset(_)
                | BotError::NoHolding(_)
                | BotError::RateLimited { .. }
                | BotError::PermissionDenied
                | BotError::NotRegistered(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
