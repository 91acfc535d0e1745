//! Minimal Telegram Bot API client: `getUpdates` and `sendMessage`

use crate::config::TelegramConfig;
use crate::error::{BotError, Result};
use crate::games::Notifier;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Telegram rejects messages longer than this
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

/// Envelope around every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramApi {
    http: Client,
    base_url: String,
    poll_timeout_secs: u64,
}

impl TelegramApi {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(BotError::Config(::config::ConfigError::Message(
                "telegram.bot_token is not set (BOT_TOKEN)".into(),
            )));
        }

        // The long poll must fit inside the HTTP timeout
        let http = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()?;

        Ok(Self {
            http,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.bot_token),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout_secs.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await?;

        unwrap_response(&response.text().await?).map(Option::unwrap_or_default)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let text = truncate(text, MAX_MESSAGE_CHARS);
        let request = SendMessageRequest {
            chat_id,
            text: &text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await?;

        unwrap_response::<serde_json::Value>(&response.text().await?)?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramApi {
    async fn notify(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await
    }
}

/// Parse a Bot API envelope, turning `ok: false` into an error
pub fn unwrap_response<T: DeserializeOwned>(body: &str) -> Result<Option<T>> {
    let response: ApiResponse<T> = serde_json::from_str(body)?;
    if !response.ok {
        return Err(BotError::Api(
            response
                .description
                .unwrap_or_else(|| "Telegram returned ok=false".to_string()),
        ));
    }
    Ok(response.result)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars - 1).collect();
    cut.push('…');
    cut
}
