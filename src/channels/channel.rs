//! Channel trait and inbound event types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Which transport an event arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Telegram,
    WhatsApp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::WhatsApp => "whatsapp",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the sender sent.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    Text(String),
    Image {
        /// Channel-specific handle passed back to `download_media`.
        media_ref: String,
        caption: Option<String>,
    },
    /// Anything else: voice notes, stickers, locations, ...
    Other { kind: String },
}

impl InboundPayload {
    /// Short label for logs.
    pub fn kind(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Image { .. } => "image",
            Self::Other { kind } => kind,
        }
    }
}

/// One message from one sender, already parsed out of the transport format.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub channel: ChannelKind,
    /// Stable sender identifier; also the reply address.
    pub sender_id: String,
    pub payload: InboundPayload,
}

impl InboundEvent {
    pub fn new(channel: ChannelKind, sender_id: impl Into<String>, payload: InboundPayload) -> Self {
        Self {
            channel,
            sender_id: sender_id.into(),
            payload,
        }
    }

    pub fn text(channel: ChannelKind, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(channel, sender_id, InboundPayload::Text(text.into()))
    }
}

/// Outbound capabilities of a messaging transport.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver `text` to `recipient`. Long texts may be split.
    async fn send(&self, recipient: &str, text: &str) -> Result<(), ChannelError>;

    /// Fetch the bytes behind a media handle from an inbound event.
    async fn download_media(&self, media_ref: &str) -> Result<Vec<u8>, ChannelError>;
}

/// Split a message into chunks of at most `max_len` bytes.
/// Tries to split on newlines, then spaces, then hard-cuts on a char
/// boundary.
pub(crate) fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
