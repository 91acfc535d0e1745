//! Read-only views: portfolio, leaderboard, player and admin statistics

use crate::error::Result;
use crate::ledger::{Ledger, CASH_DP};
use crate::price::{CacheStatus, PriceCache};
use crate::storage::Counters;
use crate::types::{GameRound, Holding, Trade, User, UserId};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Trades shown in `/stats`
pub const RECENT_TRADES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct PositionView {
    pub symbol: String,
    pub quantity: Decimal,
    /// Last known price, if any was ever fetched
    pub price: Option<Decimal>,
    pub value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioView {
    pub user: User,
    pub positions: Vec<PositionView>,
    pub holdings_value: Decimal,
    pub net_worth: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user: User,
    pub holdings_value: Decimal,
    pub net_worth: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub portfolio: PortfolioView,
    pub profit_loss: Decimal,
    /// Profit or loss as a percentage of the starting balance
    pub profit_pct: Decimal,
    pub recent_trades: Vec<Trade>,
    pub pending_predictions: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminStats {
    pub counters: Counters,
    pub active_24h: i64,
    pub cache: CacheStatus,
}

pub struct StatsView {
    ledger: Arc<Ledger>,
    prices: Arc<PriceCache>,
}

impl StatsView {
    pub fn new(ledger: Arc<Ledger>, prices: Arc<PriceCache>) -> Self {
        Self { ledger, prices }
    }

    /// Prices for valuation: refresh if possible, otherwise whatever is cached
    async fn valuation_prices(&self) -> HashMap<String, Decimal> {
        if let Err(e) = self.prices.all_prices().await {
            debug!("Valuing holdings without fresh prices: {}", e);
        }
        self.prices.snapshot()
    }

    pub async fn portfolio(&self, user_id: UserId) -> Result<PortfolioView> {
        let user = self.ledger.user(user_id).await?;
        let holdings = self.ledger.database().get_holdings(user_id).await?;
        let prices = self.valuation_prices().await;
        Ok(value_portfolio(user, holdings, &prices))
    }

    /// Top players by cash balance, valued at cached prices
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let db = self.ledger.database();
        let prices = self.prices.snapshot();
        let mut entries = Vec::new();

        for (i, user) in db.top_users_by_balance(limit).await?.into_iter().enumerate() {
            let holdings = db.get_holdings(user.user_id).await?;
            let view = value_portfolio(user, holdings, &prices);
            entries.push(LeaderboardEntry {
                rank: i + 1,
                holdings_value: view.holdings_value,
                net_worth: view.net_worth,
                user: view.user,
            });
        }
        Ok(entries)
    }

    pub async fn user_stats(&self, user_id: UserId) -> Result<UserStats> {
        let portfolio = self.portfolio(user_id).await?;
        let db = self.ledger.database();
        let recent_trades = db.recent_trades(user_id, RECENT_TRADES).await?;
        let pending_predictions = db.pending_rounds_for_user(user_id).await?.len();

        let start = self.ledger.starting_balance();
        let profit_loss = portfolio.net_worth - start;
        let profit_pct = if start.is_zero() {
            Decimal::ZERO
        } else {
            (profit_loss / start * Decimal::ONE_HUNDRED).round_dp(1)
        };

        Ok(UserStats {
            portfolio,
            profit_loss,
            profit_pct,
            recent_trades,
            pending_predictions,
        })
    }

    pub async fn pending_predictions(&self, user_id: UserId) -> Result<Vec<GameRound>> {
        self.ledger.user(user_id).await?;
        self.ledger.database().pending_rounds_for_user(user_id).await
    }

    pub async fn admin_stats(&self) -> Result<AdminStats> {
        let db = self.ledger.database();
        Ok(AdminStats {
            counters: db.counters().await?,
            active_24h: db.active_users_since(Utc::now() - Duration::hours(24)).await?,
            cache: self.prices.status(),
        })
    }
}

fn value_portfolio(user: User, holdings: Vec<Holding>, prices: &HashMap<String, Decimal>) -> PortfolioView {
    let positions: Vec<PositionView> = holdings
        .into_iter()
        .map(|h| {
            let price = prices.get(&h.symbol).copied();
            PositionView {
                value: price.map(|p| (h.quantity * p).round_dp(CASH_DP)),
                price,
                quantity: h.quantity,
                symbol: h.symbol,
            }
        })
        .collect();

    let holdings_value: Decimal = positions.iter().filter_map(|p| p.value).sum();
    PortfolioView {
        net_worth: user.balance + holdings_value,
        user,
        positions,
        holdings_value,
    }
}
