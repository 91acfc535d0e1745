//! Background settlement of pending predictions
//!
//! Pending rounds live in the database, so a restart picks up where the
//! last process left off.

use super::GameEngine;
use crate::commands::format;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delivers messages to a chat outside of a command reply
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat_id: i64, text: &str) -> Result<()>;
}

pub struct SettlementScheduler {
    engine: Arc<GameEngine>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

impl SettlementScheduler {
    pub fn new(engine: Arc<GameEngine>, notifier: Arc<dyn Notifier>, interval: Duration) -> Self {
        Self {
            engine,
            notifier,
            interval,
        }
    }

    /// Settle everything due at `now` and tell each player. Returns the
    /// number of rounds settled.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let settled = self.engine.resolve_due(now).await?;
        let count = settled.len();

        let deliveries = settled.iter().map(|receipt| async move {
            let chat_id = receipt
                .round
                .prediction
                .as_ref()
                .map(|p| p.chat_id)
                .unwrap_or(receipt.round.user_id);
            let text = format::prediction_settled(receipt);
            if let Err(e) = self.notifier.notify(chat_id, &text).await {
                warn!("Could not notify chat {} about round {}: {}", chat_id, receipt.round.id, e);
            }
        });
        join_all(deliveries).await;

        Ok(count)
    }

    pub async fn run(self) {
        info!("Prediction settlement every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.tick(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => debug!("Settlement tick resolved {} rounds", n),
                Err(e) => error!("Settlement tick failed: {}", e),
            }
        }
    }
}
