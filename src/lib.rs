//! Fake Crypto Casino Bot
//!
//! A Telegram bot for trading crypto at live CoinGecko prices with fake
//! money, plus coin flip, slots, dice and price-prediction games.
//!
//! ## Architecture
//!
//! ```text
//! Telegram (getUpdates) → Dispatcher → Trading / Games / Stats → Ledger → SQLite
//!                                          ↑
//!                              Price Cache ← CoinGecko
//! Settlement scheduler → Games → Ledger, Notifier → Telegram (sendMessage)
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod games;
pub mod ledger;
pub mod price;
pub mod stats;
pub mod storage;
pub mod telegram;
pub mod trading;
pub mod types;

#[cfg(test)]
pub mod testing;

#[cfg(test)]
mod integration_tests;
