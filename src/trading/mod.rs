//! Trading engine
//!
//! Turns `/buy` and `/sell` into ledger transfers at cached prices.


use crate::error::{BotError, Result};
use crate::ledger::{AssetTransfer, Ledger, TradeReceipt, CASH_DP};
use crate::price::PriceCache;
use crate::types::UserId;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Result of a buy or sell
#[derive(Debug, Clone)]
pub struct TradeConfirmation {
    pub receipt: TradeReceipt,
    /// The price came from a cache entry past its TTL
    pub price_stale: bool,
}

pub struct TradingEngine {
    ledger: Arc<Ledger>,
    prices: Arc<PriceCache>,
}

impl TradingEngine {
    pub fn new(ledger: Arc<Ledger>, prices: Arc<PriceCache>) -> Self {
        Self { ledger, prices }
    }

    /// Spend `amount` of cash on `symbol`
    pub async fn buy(&self, user_id: UserId, symbol: &str, amount: Decimal) -> Result<TradeConfirmation> {
        let symbol = self.prices.resolve_symbol(symbol)?;
        let amount = amount.round_dp(CASH_DP);
        if amount <= Decimal::ZERO {
            return Err(BotError::Validation("amount must be at least 0.01".into()));
        }

        let user = self.ledger.user(user_id).await?;
        if amount > user.balance {
            return Err(BotError::InsufficientFunds {
                needed: amount,
                available: user.balance,
            });
        }

        let quote = self.prices.get_price(&symbol).await?;
        debug!("Buying {} {} for user {} at {}", amount, symbol, user_id, quote.price);

        let receipt = self
            .ledger
            .transfer_asset(AssetTransfer::Buy {
                user_id,
                symbol,
                cash: amount,
                price: quote.price,
            })
            .await?;

        Ok(TradeConfirmation {
            receipt,
            price_stale: quote.stale,
        })
    }

    /// Liquidate the whole holding of `symbol`
    pub async fn sell(&self, user_id: UserId, symbol: &str) -> Result<TradeConfirmation> {
        let symbol = self.prices.resolve_symbol(symbol)?;
        self.ledger.user(user_id).await?;

        // No point hitting the price feed for nothing to sell
        let held = self.ledger.database().get_holding(user_id, &symbol).await?;
        if held.map_or(true, |h| h.quantity <= Decimal::ZERO) {
            return Err(BotError::NoHolding(symbol));
        }

        let quote = self.prices.get_price(&symbol).await?;
        debug!("Selling {} for user {} at {}", symbol, user_id, quote.price);

        let receipt = self
            .ledger
            .transfer_asset(AssetTransfer::SellAll {
                user_id,
                symbol,
                price: quote.price,
            })
            .await?;

        Ok(TradeConfirmation {
            receipt,
            price_stale: quote.stale,
        })
    }
}
