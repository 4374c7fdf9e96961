//! Telegram Bot channel: long polling plus message and photo sending via the Bot API.

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use korona_core::config::TelegramSection;
use korona_core::error::{KoronaError, Result};
use korona_core::traits::Transport;
use korona_core::types::IncomingMessage;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
/// Long-poll timeout handed to getUpdates, seconds.
const LONG_POLL_SECS: u64 = 30;

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_poll_interval() -> u64 {
    1
}
fn default_api_base() -> String {
    DEFAULT_API_BASE.into()
}

impl From<&TelegramSection> for TelegramConfig {
    fn from(section: &TelegramSection) -> Self {
        Self {
            bot_token: section.bot_token.clone(),
            poll_interval: section.poll_interval,
            api_base: default_api_base(),
        }
    }
}

/// Telegram Bot channel. Cheap to clone; clones share the HTTP client.
#[derive(Clone)]
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Get updates after `last_update_id` using long polling.
    pub async fn get_updates(&self, last_update_id: i64) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", (last_update_id + 1).to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
                ("allowed_updates", "[\"message\",\"edited_message\"]".into()),
            ])
            .timeout(std::time::Duration::from_secs(LONG_POLL_SECS + 10))
            .send()
            .await
            .map_err(|e| KoronaError::channel(format!("Telegram getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| KoronaError::channel(format!("Invalid Telegram response: {e}")))?;

        if !body.ok {
            return Err(KoronaError::channel(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        Ok(body.result.unwrap_or_default())
    }

    /// Send a plain text message.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| KoronaError::delivery(format!("sendMessage failed: {e}")))?;

        check_sent(response, "sendMessage").await
    }

    /// Upload a photo from disk with a caption.
    pub async fn send_photo(&self, chat_id: &str, path: &Path, caption: &str) -> Result<()> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            KoronaError::delivery(format!("Cannot read picture {}: {e}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "picture.jpg".into());

        let photo = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(|e| KoronaError::delivery(format!("Invalid photo part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let response = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| KoronaError::delivery(format!("sendPhoto failed: {e}")))?;

        check_sent(response, "sendPhoto").await
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| KoronaError::channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| KoronaError::channel(format!("Invalid getMe response: {e}")))?;
        if !body.ok {
            return Err(KoronaError::channel(format!(
                "getMe rejected: {}",
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| KoronaError::channel("No bot info"))
    }

    /// Start the polling loop and return a stream of IncomingMessages.
    /// Dropping the stream ends the loop after the current poll.
    pub fn start_polling(&self) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let channel = self.clone();

        tokio::spawn(async move {
            let mut last_update_id = 0;
            tracing::info!("Telegram polling loop started");

            loop {
                match channel.get_updates(last_update_id).await {
                    Ok(updates) => {
                        for update in updates {
                            last_update_id = last_update_id.max(update.update_id);
                            if let Some(msg) = update.to_incoming()
                                && tx.send(msg).is_err()
                            {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                }

                if tx.is_closed() {
                    tracing::info!("Telegram polling stopped (receiver dropped)");
                    return;
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(
                    channel.config.poll_interval,
                ))
                .await;
            }
        });

        TelegramPollingStream { rx }
    }
}

async fn check_sent(response: reqwest::Response, method: &str) -> Result<()> {
    let status = response.status();
    let result: TelegramApiResponse<serde_json::Value> = response
        .json()
        .await
        .map_err(|e| KoronaError::delivery(format!("Invalid {method} response ({status}): {e}")))?;

    if !result.ok {
        return Err(KoronaError::delivery(format!(
            "{method} failed: {}",
            result.description.unwrap_or_default()
        )));
    }
    Ok(())
}

/// Stream of incoming Telegram messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[async_trait]
impl Transport for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(&self, user_id: &str, text: &str) -> Result<()> {
        self.send_message(user_id, text).await
    }

    async fn send_image(&self, user_id: &str, path: &Path, caption: &str) -> Result<()> {
        self.send_photo(user_id, path, caption).await
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
    pub edited_message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

impl TelegramUpdate {
    /// Convert to an IncomingMessage. Edited messages count as new ones;
    /// non-text and bot-authored messages are skipped.
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref().or(self.edited_message.as_ref())?;
        let text = msg.text.as_ref()?;
        let from = msg.from.as_ref()?;

        if from.is_bot {
            return None;
        }

        Some(IncomingMessage {
            channel: "telegram".into(),
            chat_id: msg.chat.id.to_string(),
            sender_id: from.id.to_string(),
            sender_name: Some(format!(
                "{}{}",
                from.first_name,
                from.last_name
                    .as_deref()
                    .map(|l| format!(" {l}"))
                    .unwrap_or_default()
            )),
            content: text.clone(),
            timestamp: chrono::DateTime::from_timestamp(msg.date, 0)
                .unwrap_or_else(chrono::Utc::now),
        })
    }
}
