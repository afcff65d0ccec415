// WhatsApp Gateway — Session Transport Contract
// SessionTransport trait, TransportEvent, OutboundPayload, DeliveryReceipt,
// Chat / Message read models, IncomingMessage

use crate::atoms::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ── Events ─────────────────────────────────────────────────────────────────

/// Lifecycle and message events emitted by the transport, at most once per
/// physical occurrence. Order is authoritative.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Qr(String),
    Authenticated,
    Ready,
    Disconnected,
    Message(IncomingMessage),
}

impl TransportEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Qr(_) => "qr",
            TransportEvent::Authenticated => "authenticated",
            TransportEvent::Ready => "ready",
            TransportEvent::Disconnected => "disconnected",
            TransportEvent::Message(_) => "message",
        }
    }
}

pub type EventSender = mpsc::Sender<TransportEvent>;
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// Inbound chat message, normalized from whatever the transport delivers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomingMessage {
    pub id: Option<String>,
    /// Chat the message arrived in (user or group JID).
    pub chat_id: String,
    /// Author JID; equals `chat_id` for direct messages.
    pub sender: String,
    pub push_name: Option<String>,
    pub body: String,
    pub from_me: bool,
}

impl IncomingMessage {
    pub fn is_group(&self) -> bool {
        self.chat_id.ends_with("@g.us")
    }

    /// Broadcast lists and status updates cannot be replied to.
    pub fn is_addressable(&self) -> bool {
        !self.chat_id.is_empty()
            && !self.chat_id.ends_with("@broadcast")
            && !self.chat_id.ends_with("@newsletter")
    }
}

// ── Outbound ───────────────────────────────────────────────────────────────

/// Media to be fetched by the transport and attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub url: String,
    /// "image" | "video" | "audio" | "document"
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    Media {
        media: MediaReference,
        caption: Option<String>,
    },
}

/// A validated send request. Constructed per call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessageRequest {
    pub recipient: String,
    pub payload: OutboundPayload,
}

impl OutboundMessageRequest {
    pub fn text(recipient: &str, body: &str) -> GatewayResult<Self> {
        Ok(OutboundMessageRequest {
            recipient: validate_recipient(recipient)?,
            payload: OutboundPayload::Text(body.to_string()),
        })
    }

    pub fn media(
        recipient: &str,
        media_url: Option<&str>,
        media_type: Option<&str>,
        caption: Option<&str>,
    ) -> GatewayResult<Self> {
        let url = media_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(GatewayError::MissingMediaReference)?;
        let media_type = media_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| infer_media_type(url).to_string());
        Ok(OutboundMessageRequest {
            recipient: validate_recipient(recipient)?,
            payload: OutboundPayload::Media {
                media: MediaReference { url: url.to_string(), media_type },
                caption: caption.map(str::to_string).filter(|c| !c.is_empty()),
            },
        })
    }
}

fn validate_recipient(recipient: &str) -> GatewayResult<String> {
    let trimmed = recipient.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::InvalidRecipient("recipient is empty".into()));
    }
    Ok(trimmed.to_string())
}

/// Guess the Evolution `mediatype` from the URL's file extension.
pub(crate) fn infer_media_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" => "image",
        "mp4" | "mov" | "3gp" => "video",
        "mp3" | "ogg" | "opus" | "m4a" | "aac" => "audio",
        _ => "document",
    }
}

/// Transport acknowledgement of a sent message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReceipt {
    pub id: Option<String>,
    pub recipient: String,
    pub status: Option<String>,
    pub sent_at: DateTime<Utc>,
    /// Untouched transport response.
    pub raw: serde_json::Value,
}

// ── Read models ────────────────────────────────────────────────────────────

/// Chat as returned by the transport. Opaque beyond its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chat(pub serde_json::Value);

/// Message as returned by the transport. Opaque beyond its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(pub serde_json::Value);

impl Chat {
    pub fn id(&self) -> Option<&str> {
        self.0["id"].as_str().or_else(|| self.0["remoteJid"].as_str())
    }
}

impl Message {
    pub fn id(&self) -> Option<&str> {
        self.0["key"]["id"].as_str().or_else(|| self.0["id"].as_str())
    }
}

// ── Transport trait ────────────────────────────────────────────────────────

/// Command side of the automation channel. Events flow separately through
/// the `EventSender` the transport was built with.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Start the channel. Fails with `TransportInit`.
    async fn initialize(&self) -> GatewayResult<()>;

    /// Fails with `TransportSend` or `InvalidRecipient`.
    async fn send(&self, recipient: &str, payload: &OutboundPayload) -> GatewayResult<DeliveryReceipt>;

    /// Fails with `TransportFetch`.
    async fn fetch_chats(&self) -> GatewayResult<Vec<Chat>>;

    /// Fails with `TransportFetch`.
    async fn fetch_messages(&self, chat_id: &str) -> GatewayResult<Vec<Message>>;

    async fn logout(&self) -> GatewayResult<()>;
}
