//! Telegram transport
//!
//! Long-polls `getUpdates`, hands each command to the [`Dispatcher`] on its
//! own task and posts the reply back to the chat it came from.

pub mod api;

pub use api::TelegramApi;

use crate::commands::{Dispatcher, IncomingMessage};
use api::TelegramUpdate;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct TelegramBot {
    api: Arc<TelegramApi>,
    dispatcher: Arc<Dispatcher>,
    next_update_id: AtomicI64,
}

/// Extract a command message from an update. Bots and updates without
/// text or sender are skipped.
pub fn incoming_message(update: TelegramUpdate) -> Option<IncomingMessage> {
    let message = update.message?;
    let from = message.from?;
    if from.is_bot {
        return None;
    }
    let text = message.text?;

    Some(IncomingMessage {
        user_id: from.id,
        chat_id: message.chat.id,
        display_name: Some(from.username.unwrap_or(from.first_name)),
        text,
    })
}

impl TelegramBot {
    pub fn new(api: Arc<TelegramApi>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            api,
            dispatcher,
            next_update_id: AtomicI64::new(0),
        }
    }

    /// Poll forever
    pub async fn start_polling(self: Arc<Self>) {
        info!("Starting Telegram long polling...");

        loop {
            let offset = self.next_update_id.load(Ordering::SeqCst);
            match self.api.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        self.next_update_id
                            .fetch_max(update.update_id + 1, Ordering::SeqCst);
                        if let Some(msg) = incoming_message(update) {
                            self.spawn_reply(msg);
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to poll Telegram updates: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    fn spawn_reply(&self, msg: IncomingMessage) {
        let api = self.api.clone();
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            let Some(reply) = dispatcher.handle(&msg).await else {
                return;
            };
            if let Err(e) = api.send_message(msg.chat_id, &reply).await {
                warn!("Failed to reply in chat {}: {}", msg.chat_id, e);
            }
        });
    }
}
