use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incoming message from the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Channel name (e.g. "telegram").
    pub channel: String,
    /// Platform chat identifier.
    pub chat_id: i64,
    /// Whether this message comes from a group chat.
    pub is_group: bool,
    /// Platform message identifier within the chat.
    pub message_id: i64,
    pub sender: Sender,
    /// Message text or caption; empty string when the message has neither.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Set when the message was forwarded from elsewhere.
    #[serde(default)]
    pub forward: Option<ForwardInfo>,
    /// Set when the message carries a voice note.
    #[serde(default)]
    pub voice: Option<VoiceAttachment>,
}

/// The sender of an incoming message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

impl Sender {
    /// Markdown mention for this sender: `@username` when available,
    /// otherwise a `tg://user` deep link on the first name.
    pub fn mention(&self) -> String {
        match &self.username {
            Some(username) => format!("@{username}"),
            None => format!("[{}](tg://user?id={})", self.first_name, self.id),
        }
    }
}

/// Forward metadata on an incoming message.
///
/// `origin` is only present when the platform exposes the original chat and
/// message ids (channel posts). Forwards from users or hidden origins carry
/// no origin pair and are fingerprinted by content instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardInfo {
    #[serde(default)]
    pub origin: Option<ForwardOrigin>,
}

/// The original chat and message a forward points back to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForwardOrigin {
    pub chat_id: i64,
    pub message_id: i64,
}

/// A voice note reference on an incoming message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceAttachment {
    /// Platform file handle used to download the audio bytes.
    pub file_id: String,
    /// Duration in seconds.
    pub duration: i64,
    pub mime_type: Option<String>,
}

/// An outgoing message to send through the channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    /// Message id to attach this message to as a reply.
    #[serde(default)]
    pub reply_to: Option<i64>,
    /// Whether to send with Markdown formatting.
    #[serde(default)]
    pub markdown: bool,
}
