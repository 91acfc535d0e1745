//! Chat command parsing and dispatch
//!
//! Order of checks for every command: admin gate, cooldown, argument
//! validation, then the engine call. Every error is turned into a chat
//! reply here.

pub mod cooldown;
pub mod format;

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{BotError, Result};
use crate::games::GameEngine;
use crate::ledger::Ledger;
use crate::price::PriceCache;
use crate::stats::StatsView;
use crate::trading::TradingEngine;
use crate::types::{Direction, UserId};
use cooldown::Cooldowns;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Players shown by `/leaderboard`
pub const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Help,
    Prices,
    Buy { symbol: String, amount: Decimal },
    Sell { symbol: String },
    Portfolio,
    CoinFlip { bet: Decimal },
    Slots { bet: Decimal },
    Predict {
        symbol: String,
        direction: Direction,
        bet: Decimal,
    },
    Predictions,
    Roll { bet: Decimal },
    Leaderboard,
    Stats,
    AdminStats,
    Unknown(String),
}

/// Split `/name@bot arg1 arg2` into a lowercase name and its arguments.
/// Returns `None` for text that is not a command.
pub fn split_command(text: &str) -> Option<(String, Vec<&str>)> {
    let body = text.trim().strip_prefix('/')?;
    let mut parts = body.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, parts.collect()))
}

fn usage(text: &str) -> BotError {
    BotError::Validation(format!("Usage: {}", text))
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    let cleaned: String = raw.trim_start_matches('$').chars().filter(|c| *c != ',').collect();
    Decimal::from_str(&cleaned)
        .map_err(|_| BotError::Validation(format!("Invalid amount: {}. Use numbers only!", raw)))
}

impl Command {
    pub fn from_parts(name: &str, args: &[&str]) -> Result<Self> {
        let command = match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "prices" => Command::Prices,
            "portfolio" => Command::Portfolio,
            "predictions" => Command::Predictions,
            "leaderboard" => Command::Leaderboard,
            "stats" => Command::Stats,
            "adminstats" => Command::AdminStats,
            "buy" => match args {
                [symbol, amount] => Command::Buy {
                    symbol: symbol.to_string(),
                    amount: parse_amount(amount)?,
                },
                _ => return Err(usage("/buy <COIN> <AMOUNT>\nExample: /buy BTC 1000")),
            },
            "sell" => match args {
                [symbol] => Command::Sell {
                    symbol: symbol.to_string(),
                },
                _ => return Err(usage("/sell <COIN>\nExample: /sell BTC")),
            },
            "coinflip" | "slots" | "roll" => {
                let bet = match args {
                    [amount] => parse_amount(amount)?,
                    _ => return Err(usage(&format!("/{} <AMOUNT>\nExample: /{} 100", name, name))),
                };
                match name {
                    "coinflip" => Command::CoinFlip { bet },
                    "slots" => Command::Slots { bet },
                    _ => Command::Roll { bet },
                }
            }
            "predict" => match args {
                [symbol, direction, amount] => Command::Predict {
                    symbol: symbol.to_string(),
                    direction: direction.parse()?,
                    bet: parse_amount(amount)?,
                },
                _ => {
                    return Err(usage(
                        "/predict <COIN> <UP|DOWN> <AMOUNT>\nExample: /predict BTC UP 100",
                    ))
                }
            },
            other => Command::Unknown(other.to_string()),
        };
        Ok(command)
    }
}

/// A chat message addressed to the bot
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub user_id: UserId,
    pub chat_id: i64,
    pub display_name: Option<String>,
    pub text: String,
}

pub struct Dispatcher {
    config: Arc<Config>,
    ledger: Arc<Ledger>,
    prices: Arc<PriceCache>,
    trading: TradingEngine,
    games: Arc<GameEngine>,
    stats: StatsView,
    cooldowns: Cooldowns,
    command_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        config: Arc<Config>,
        ledger: Arc<Ledger>,
        prices: Arc<PriceCache>,
        games: Arc<GameEngine>,
    ) -> Self {
        Self {
            trading: TradingEngine::new(ledger.clone(), prices.clone()),
            stats: StatsView::new(ledger.clone(), prices.clone()),
            cooldowns: Cooldowns::new(config.cooldowns.clone()),
            command_timeout: Duration::from_secs(config.telegram.command_timeout_secs),
            config,
            ledger,
            prices,
            games,
        }
    }

    /// Replace the dispatch timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Handle one message. Returns the reply, or `None` if the text was not
    /// a command.
    pub async fn handle(&self, msg: &IncomingMessage) -> Option<String> {
        let (name, args) = split_command(&msg.text)?;
        debug!("User {} sent /{} {:?}", msg.user_id, name, args);

        let reply = match tokio::time::timeout(self.command_timeout, self.dispatch(msg, &name, &args)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                if e.is_user_error() {
                    debug!("/{} from user {} rejected: {}", name, msg.user_id, e);
                } else {
                    error!("/{} from user {} failed: {}", name, msg.user_id, e);
                }
                format::error(&e)
            }
            Err(_) => {
                warn!("/{} from user {} timed out after {:?}", name, msg.user_id, self.command_timeout);
                format::timed_out()
            }
        };
        Some(reply)
    }

    async fn dispatch(&self, msg: &IncomingMessage, name: &str, args: &[&str]) -> Result<String> {
        if name == "adminstats" && !self.config.telegram.is_admin(msg.user_id) {
            warn!("User {} tried /adminstats", msg.user_id);
            return Err(BotError::PermissionDenied);
        }
        self.cooldowns.check(msg.user_id, name)?;
        let command = Command::from_parts(name, args)?;

        if command != Command::Start {
            self.ledger.touch(msg.user_id).await?;
        }
        self.execute(msg, command).await
    }

    async fn execute(&self, msg: &IncomingMessage, command: Command) -> Result<String> {
        let user_id = msg.user_id;
        let text = match command {
            Command::Start => {
                let (user, created) = self
                    .ledger
                    .open_account(user_id, msg.display_name.as_deref())
                    .await?;
                format::welcome(&user, created)
            }
            Command::Help => format::help(
                &self.prices.symbols(),
                self.config.games.prediction.settle_delay_secs,
            ),
            Command::Prices => {
                let quotes = self.prices.all_prices().await?;
                format::prices(&quotes, self.config.prices.cache_ttl_secs)
            }
            Command::Buy { symbol, amount } => {
                format::trade(&self.trading.buy(user_id, &symbol, amount).await?)
            }
            Command::Sell { symbol } => format::trade(&self.trading.sell(user_id, &symbol).await?),
            Command::Portfolio => format::portfolio(&self.stats.portfolio(user_id).await?),
            Command::CoinFlip { bet } => format::game(&self.games.coin_flip(user_id, bet).await?),
            Command::Slots { bet } => format::game(&self.games.slots(user_id, bet).await?),
            Command::Roll { bet } => format::game(&self.games.roll_dice(user_id, bet).await?),
            Command::Predict {
                symbol,
                direction,
                bet,
            } => {
                let ticket = self
                    .games
                    .place_prediction(user_id, msg.chat_id, &symbol, direction, bet)
                    .await?;
                info!(
                    "User {} predicts {} {} from {} for {}",
                    user_id,
                    ticket.round.prediction.as_ref().map_or("?", |p| p.symbol.as_str()),
                    direction.as_str(),
                    ticket.start_price,
                    ticket.round.bet
                );
                format::prediction_placed(&ticket)
            }
            Command::Predictions => {
                format::pending_predictions(&self.stats.pending_predictions(user_id).await?)
            }
            Command::Leaderboard => {
                format::leaderboard(&self.stats.leaderboard(LEADERBOARD_SIZE).await?)
            }
            Command::Stats => format::user_stats(&self.stats.user_stats(user_id).await?),
            Command::AdminStats => format::admin_stats(&self.stats.admin_stats().await?),
            Command::Unknown(name) => format::unknown_command(&name),
        };
        Ok(text)
    }
}
