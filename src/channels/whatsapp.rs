//! WhatsApp channel: Cloud API for outbound, webhooks for inbound.
//!
//! Inbound messages arrive on the HTTP server (see `server`); this module
//! parses them and performs the outbound calls.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::channels::channel::split_message;
use crate::channels::{ChannelAdapter, ChannelKind, InboundEvent, InboundPayload};
use crate::config::WhatsAppConfig;
use crate::error::ChannelError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum text body length accepted by the Cloud API.
const WHATSAPP_MAX_MESSAGE_LENGTH: usize = 4096;

const GRAPH_API_BASE: &str = "https://graph.facebook.com";

// ── Webhook payload ─────────────────────────────────────────────────

/// Top-level webhook notification body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    pub metadata: Option<ChangeMetadata>,
    /// Absent on status-only notifications.
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeMetadata {
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub text: Option<TextBody>,
    pub image: Option<MediaBody>,
    pub document: Option<MediaBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaBody {
    pub id: String,
    pub caption: Option<String>,
    pub mime_type: Option<String>,
}

impl WebhookMessage {
    /// Map to the channel-neutral payload.
    fn payload(&self) -> InboundPayload {
        match self.message_type.as_str() {
            "text" => InboundPayload::Text(
                self.text.as_ref().map(|t| t.body.clone()).unwrap_or_default(),
            ),
            "image" => match &self.image {
                Some(image) => InboundPayload::Image {
                    media_ref: image.id.clone(),
                    caption: image.caption.clone(),
                },
                None => InboundPayload::Other {
                    kind: "image".into(),
                },
            },
            "document" => match &self.document {
                Some(doc)
                    if doc
                        .mime_type
                        .as_deref()
                        .is_some_and(|m| m.starts_with("image/")) =>
                {
                    InboundPayload::Image {
                        media_ref: doc.id.clone(),
                        caption: doc.caption.clone(),
                    }
                }
                _ => InboundPayload::Other {
                    kind: "document".into(),
                },
            },
            other => InboundPayload::Other {
                kind: other.to_string(),
            },
        }
    }
}

// ── Channel ─────────────────────────────────────────────────────────

/// WhatsApp Cloud API channel.
pub struct WhatsAppChannel {
    config: WhatsAppConfig,
    api_base: String,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            api_base: GRAPH_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}/{path}", self.api_base, self.config.api_version)
    }

    fn download_error(media_ref: &str, reason: impl Into<String>) -> ChannelError {
        ChannelError::MediaDownloadFailed {
            name: "whatsapp".into(),
            media_ref: media_ref.to_string(),
            reason: reason.into(),
        }
    }

    /// Answer the `GET` subscription handshake.
    ///
    /// Returns the challenge to echo when the mode and token match.
    pub fn verify_subscription(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> Option<String> {
        let mode = mode?;
        let token = token?;
        let challenge = challenge?;

        let expected = self.config.verify_token.expose_secret();
        if mode == "subscribe" && !expected.is_empty() && token == expected {
            Some(challenge.to_string())
        } else {
            None
        }
    }

    /// Check `X-Hub-Signature-256`. Always passes when no app secret is set.
    pub fn verify_signature(&self, body: &[u8], signature_header: Option<&str>) -> bool {
        match &self.config.app_secret {
            None => true,
            Some(secret) => signature_header
                .is_some_and(|header| verify_signature(body, header, secret.expose_secret())),
        }
    }

    /// Extract inbound events from a webhook notification.
    ///
    /// Changes addressed to another phone number id are skipped.
    pub fn events(&self, payload: &WebhookPayload) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        for entry in &payload.entry {
            for change in &entry.changes {
                if change.field != "messages" {
                    debug!(field = %change.field, "Ignoring non-message webhook change");
                    continue;
                }
                if let Some(metadata) = &change.value.metadata
                    && metadata.phone_number_id != self.config.phone_number_id
                {
                    warn!(
                        expected = %self.config.phone_number_id,
                        received = %metadata.phone_number_id,
                        "Phone number id mismatch"
                    );
                    continue;
                }
                for message in &change.value.messages {
                    events.push(InboundEvent::new(
                        ChannelKind::WhatsApp,
                        message.from.clone(),
                        message.payload(),
                    ));
                }
            }
        }
        events
    }

    async fn send_chunk(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": recipient,
            "type": "text",
            "text": { "body": text }
        });

        let resp = self
            .client
            .post(self.api_url(&format!("{}/messages", self.config.phone_number_id)))
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: format!("messages returned {status}: {detail}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::WhatsApp
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, WHATSAPP_MAX_MESSAGE_LENGTH) {
            self.send_chunk(recipient, &chunk).await?;
        }
        Ok(())
    }

    /// Resolve the media id to a short-lived URL, then fetch it. Both
    /// requests need the access token.
    async fn download_media(&self, media_ref: &str) -> Result<Vec<u8>, ChannelError> {
        let token = self.config.access_token.expose_secret();

        let meta: Value = self
            .client
            .get(self.api_url(media_ref))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Self::download_error(media_ref, e.to_string()))?
            .json()
            .await
            .map_err(|e| Self::download_error(media_ref, e.to_string()))?;

        let url = meta
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Self::download_error(media_ref, "media lookup returned no url"))?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Self::download_error(media_ref, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::download_error(
                media_ref,
                format!("media download returned {}", resp.status()),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Self::download_error(media_ref, e.to_string()))?;
        if bytes.is_empty() {
            return Err(ChannelError::EmptyMedia {
                name: "whatsapp".into(),
                media_ref: media_ref.to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}

/// Verify a `sha256=<hex>` webhook signature against `app_secret`.
pub fn verify_signature(body: &[u8], signature_header: &str, app_secret: &str) -> bool {
    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        warn!("Invalid signature header format (missing sha256= prefix)");
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use super::*;

    fn config(app_secret: Option<&str>) -> WhatsAppConfig {
        WhatsAppConfig {
            access_token: SecretString::from("token"),
            phone_number_id: "1055".into(),
            verify_token: SecretString::from("verify-me"),
            app_secret: app_secret.map(SecretString::from),
            api_version: "v21.0".into(),
        }
    }

    fn channel() -> WhatsAppChannel {
        WhatsAppChannel::new(config(None))
    }

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn payload(messages: Value) -> WebhookPayload {
        serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "metadata": {"phone_number_id": "1055"},
                        "messages": messages
                    }
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn api_url_includes_version() {
        assert_eq!(
            channel().api_url("1055/messages"),
            "https://graph.facebook.com/v21.0/1055/messages"
        );
    }

    #[test]
    fn subscription_handshake() {
        let ch = channel();
        assert_eq!(
            ch.verify_subscription(Some("subscribe"), Some("verify-me"), Some("abc")),
            Some("abc".into())
        );
        assert!(ch.verify_subscription(Some("subscribe"), Some("wrong"), Some("abc")).is_none());
        assert!(ch.verify_subscription(Some("unsubscribe"), Some("verify-me"), Some("abc")).is_none());
        assert!(ch.verify_subscription(Some("subscribe"), None, Some("abc")).is_none());
    }

    #[test]
    fn empty_verify_token_never_matches() {
        let mut cfg = config(None);
        cfg.verify_token = SecretString::from("");
        let ch = WhatsAppChannel::new(cfg);
        assert!(ch.verify_subscription(Some("subscribe"), Some(""), Some("abc")).is_none());
    }

    #[test]
    fn signature_valid_and_invalid() {
        let body = b"{\"entry\":[]}";
        assert!(verify_signature(body, &sign(body, "s3cret"), "s3cret"));
        assert!(!verify_signature(body, &sign(body, "other"), "s3cret"));
        assert!(!verify_signature(body, "deadbeef", "s3cret"));
        assert!(!verify_signature(body, "sha256=not-hex", "s3cret"));
    }

    #[test]
    fn signature_skipped_without_app_secret() {
        assert!(channel().verify_signature(b"body", None));
        let strict = WhatsAppChannel::new(config(Some("s3cret")));
        assert!(!strict.verify_signature(b"body", None));
        assert!(strict.verify_signature(b"body", Some(&sign(b"body", "s3cret"))));
    }

    #[test]
    fn events_from_text_and_image() {
        let events = channel().events(&payload(json!([
            {"from": "919800000001", "id": "m1", "type": "text", "text": {"body": "hi"}},
            {"from": "919800000001", "id": "m2", "type": "image",
             "image": {"id": "media-9", "mime_type": "image/jpeg", "caption": "dinner"}}
        ])));

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sender_id, "919800000001");
        assert_eq!(events[0].payload, InboundPayload::Text("hi".into()));
        assert_eq!(
            events[1].payload,
            InboundPayload::Image {
                media_ref: "media-9".into(),
                caption: Some("dinner".into())
            }
        );
    }

    #[test]
    fn unsupported_types_become_other() {
        let events = channel().events(&payload(json!([
            {"from": "919800000002", "type": "audio", "audio": {"id": "a1"}},
            {"from": "919800000002", "type": "document",
             "document": {"id": "d1", "mime_type": "application/pdf"}}
        ])));
        assert_eq!(events[0].payload, InboundPayload::Other { kind: "audio".into() });
        assert_eq!(events[1].payload, InboundPayload::Other { kind: "document".into() });
    }

    #[test]
    fn foreign_phone_number_and_status_updates_are_skipped() {
        let foreign: WebhookPayload = serde_json::from_value(json!({
            "entry": [{"changes": [{
                "field": "messages",
                "value": {
                    "metadata": {"phone_number_id": "9999"},
                    "messages": [{"from": "1", "type": "text", "text": {"body": "hi"}}]
                }
            }]}]
        }))
        .unwrap();
        assert!(channel().events(&foreign).is_empty());

        let statuses: WebhookPayload = serde_json::from_value(json!({
            "entry": [{"changes": [{
                "field": "messages",
                "value": {"metadata": {"phone_number_id": "1055"}, "statuses": [{"id": "x"}]}
            }]}]
        }))
        .unwrap();
        assert!(channel().events(&statuses).is_empty());
    }
}
