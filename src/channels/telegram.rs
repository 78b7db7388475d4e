//! Telegram channel: long-polls the Bot API for updates.
//!
//! Sender ids are `tg:<chat_id>` so they cannot collide with WhatsApp
//! phone numbers in the shared user table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::channels::channel::split_message;
use crate::channels::{ChannelAdapter, ChannelKind, InboundEvent, InboundPayload};
use crate::config::TelegramConfig;
use crate::conversation::ConversationRouter;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const API_BASE: &str = "https://api.telegram.org";

/// Prefix marking a sender id as a Telegram chat.
pub const SENDER_PREFIX: &str = "tg:";

/// Non-text message fields we recognise, checked in order.
const OTHER_KINDS: &[&str] = &[
    "voice", "audio", "video", "video_note", "sticker", "animation", "location", "contact",
    "document",
];

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    config: TelegramConfig,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            api_base: API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.config.bot_token.expose_secret()
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{file_path}",
            self.api_base,
            self.config.bot_token.expose_secret()
        )
    }

    fn send_error(reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: "telegram".into(),
            reason: reason.into(),
        }
    }

    fn download_error(media_ref: &str, reason: impl Into<String>) -> ChannelError {
        ChannelError::MediaDownloadFailed {
            name: "telegram".into(),
            media_ref: media_ref.to_string(),
            reason: reason.into(),
        }
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| Self::send_error(e.to_string()))?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| Self::send_error(e.to_string()))?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(Self::send_error(format!(
                "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
            )));
        }

        Ok(())
    }

    /// Long-poll `getUpdates` forever, handing each batch of events to
    /// `router` on its own task.
    pub async fn run(self: Arc<Self>, router: Arc<ConversationRouter>) {
        let mut offset: i64 = 0;
        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": self.config.poll_timeout_secs,
                "allowed_updates": ["message"]
            });

            let resp = match self
                .client
                .post(self.api_url("getUpdates"))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let data: Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram parse error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let Some(results) = data.get("result").and_then(Value::as_array) else {
                continue;
            };

            let mut events = Vec::new();
            for update in results {
                // Advance offset past this update
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = uid + 1;
                }
                events.extend(parse_update(update));
            }
            if events.is_empty() {
                continue;
            }

            let channel = Arc::clone(&self);
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router.handle_batch(channel.as_ref(), events).await;
            });
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    /// Splits long messages that exceed Telegram's 4096 char limit.
    async fn send(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        let chat_id = chat_id(recipient);
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    /// `getFile` resolves the file id to a path, which is then fetched.
    async fn download_media(&self, media_ref: &str) -> Result<Vec<u8>, ChannelError> {
        let data: Value = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": media_ref }))
            .send()
            .await
            .map_err(|e| Self::download_error(media_ref, e.to_string()))?
            .json()
            .await
            .map_err(|e| Self::download_error(media_ref, e.to_string()))?;

        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| Self::download_error(media_ref, "getFile returned no file_path"))?;

        let resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| Self::download_error(media_ref, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::download_error(
                media_ref,
                format!("file download returned {}", resp.status()),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Self::download_error(media_ref, e.to_string()))?;
        if bytes.is_empty() {
            return Err(ChannelError::EmptyMedia {
                name: "telegram".into(),
                media_ref: media_ref.to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Strip the sender prefix, leaving the numeric chat id.
fn chat_id(recipient: &str) -> &str {
    recipient.strip_prefix(SENDER_PREFIX).unwrap_or(recipient)
}

/// Turn one `getUpdates` entry into an inbound event.
///
/// Returns `None` for updates without a message or chat id.
pub fn parse_update(update: &Value) -> Option<InboundEvent> {
    let message = update.get("message")?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;
    let sender_id = format!("{SENDER_PREFIX}{chat_id}");

    let caption = message
        .get("caption")
        .and_then(Value::as_str)
        .map(String::from);

    let payload = if let Some(text) = message.get("text").and_then(Value::as_str) {
        InboundPayload::Text(text.to_string())
    } else if let Some(photos) = message.get("photo").and_then(Value::as_array) {
        // Sizes are ascending; the last one is the original resolution.
        let file_id = photos
            .last()
            .and_then(|p| p.get("file_id"))
            .and_then(Value::as_str)?;
        InboundPayload::Image {
            media_ref: file_id.to_string(),
            caption,
        }
    } else if let Some(file_id) = image_document(message) {
        InboundPayload::Image {
            media_ref: file_id.to_string(),
            caption,
        }
    } else {
        let kind = OTHER_KINDS
            .iter()
            .find(|k| message.get(**k).is_some())
            .copied()
            .unwrap_or("unknown");
        InboundPayload::Other {
            kind: kind.to_string(),
        }
    };

    Some(InboundEvent::new(ChannelKind::Telegram, sender_id, payload))
}

/// File id of a document sent uncompressed with an `image/*` MIME type.
fn image_document(message: &Value) -> Option<&str> {
    let doc = message.get("document")?;
    let mime = doc.get("mime_type").and_then(Value::as_str)?;
    if !mime.starts_with("image/") {
        return None;
    }
    doc.get("file_id").and_then(Value::as_str)
}

// ── Tests ───────────────────────────────────────────────────────────
