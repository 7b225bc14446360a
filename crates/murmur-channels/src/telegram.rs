//! Telegram Bot API channel.
//!
//! Uses long polling via `getUpdates`, with `sendMessage`, `deleteMessage`,
//! and `getFile` for chat operations.
//! Docs: <https://core.telegram.org/bots/api>

use async_trait::async_trait;
use murmur_core::{
    config::TelegramConfig,
    error::MurmurError,
    message::{ForwardInfo, ForwardOrigin, IncomingMessage, OutgoingMessage, Sender, VoiceAttachment},
    traits::Channel,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Telegram channel using the Bot API with long polling.
pub struct TelegramChannel {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    /// Tracks the last update_id to avoid reprocessing.
    last_update_id: Arc<Mutex<Option<i64>>>,
}

// --- Telegram API types ---

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: Option<TgUser>,
    chat: TgChat,
    text: Option<String>,
    caption: Option<String>,
    voice: Option<TgVoice>,
    /// Set when forwarded from a user account.
    forward_from: Option<TgUser>,
    /// Set when forwarded from a channel.
    forward_from_chat: Option<TgChat>,
    forward_from_message_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TgVoice {
    file_id: String,
    duration: i64,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TgUser {
    id: i64,
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
    /// Chat type: "private", "group", "supergroup", or "channel".
    #[serde(default, rename = "type")]
    chat_type: String,
}

impl TgMessage {
    /// Text or caption, whichever the message carries.
    fn text_content(&self) -> String {
        self.text
            .clone()
            .or_else(|| self.caption.clone())
            .unwrap_or_default()
    }

    /// Forward metadata, when this message is a forward.
    fn forward_info(&self) -> Option<ForwardInfo> {
        if self.forward_from.is_none() && self.forward_from_chat.is_none() {
            return None;
        }
        let origin = match (&self.forward_from_chat, self.forward_from_message_id) {
            (Some(chat), Some(message_id)) => Some(ForwardOrigin {
                chat_id: chat.id,
                message_id,
            }),
            _ => None,
        };
        Some(ForwardInfo { origin })
    }
}

/// Build a `t.me/c/...` link to a message in a private group or channel.
///
/// Supergroup ids carry a `-100` prefix that is not part of the link id;
/// older group ids are just negated. Telegram's web links use the bare id.
pub fn message_link(chat_id: i64, message_id: i64) -> String {
    let id_str = chat_id.to_string();
    let link_id = id_str
        .strip_prefix("-100")
        .or_else(|| id_str.strip_prefix('-'))
        .unwrap_or(&id_str)
        .to_string();
    format!("https://t.me/c/{link_id}/{message_id}")
}

impl TelegramChannel {
    /// Create a new Telegram channel from config.
    pub fn new(config: TelegramConfig) -> Self {
        let base_url = format!("https://api.telegram.org/bot{}", config.bot_token);
        Self {
            client: reqwest::Client::new(),
            base_url,
            bot_token: config.bot_token,
            last_update_id: Arc::new(Mutex::new(None)),
        }
    }

    /// Send a text message, optionally as a reply, optionally with Markdown.
    ///
    /// Markdown sends that fail entity parsing are retried as plain text so
    /// arbitrary transcript or summary content never gets dropped.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
        markdown: bool,
    ) -> Result<(), MurmurError> {
        let chunks = split_message(text, 4096);

        for chunk in chunks {
            let url = format!("{}/sendMessage", self.base_url);
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if let Some(reply_id) = reply_to {
                body["reply_to_message_id"] = serde_json::json!(reply_id);
            }
            if markdown {
                body["parse_mode"] = serde_json::json!("Markdown");
            }

            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| MurmurError::Channel(format!("telegram send failed: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                let error_text = resp.text().await.unwrap_or_default();
                if markdown && error_text.contains("can't parse entities") {
                    debug!("Markdown parse failed, retrying as plain text");
                    if let Some(obj) = body.as_object_mut() {
                        obj.remove("parse_mode");
                    }
                    self.client
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| {
                            MurmurError::Channel(format!("telegram send (plain) failed: {e}"))
                        })?;
                } else {
                    return Err(MurmurError::Channel(format!(
                        "telegram send got {status}: {error_text}"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, MurmurError> {
        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let last_update_id = self.last_update_id.clone();

        info!("Telegram channel starting long polling...");

        tokio::spawn(async move {
            let mut backoff_secs: u64 = 1;

            loop {
                let last = last_update_id.lock().await;
                let offset = last.map(|id| id + 1);
                drop(last);

                let mut url = format!("{base_url}/getUpdates?timeout=30");
                if let Some(off) = offset {
                    url.push_str(&format!("&offset={off}"));
                }

                let resp = match client
                    .get(&url)
                    .timeout(std::time::Duration::from_secs(35))
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        error!("telegram poll error (retry in {backoff_secs}s): {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(60);
                        continue;
                    }
                };

                let body: TgResponse<Vec<TgUpdate>> = match resp.json().await {
                    Ok(b) => b,
                    Err(e) => {
                        error!("telegram parse error (retry in {backoff_secs}s): {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(60);
                        continue;
                    }
                };

                if !body.ok {
                    error!(
                        "telegram API error (retry in {backoff_secs}s): {}",
                        body.description.unwrap_or_default()
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(60);
                    continue;
                }

                // Successful poll — reset backoff.
                backoff_secs = 1;

                let updates = body.result.unwrap_or_default();

                if let Some(last_update) = updates.last() {
                    *last_update_id.lock().await = Some(last_update.update_id);
                }

                for update in updates {
                    let msg = match update.message {
                        Some(m) => m,
                        None => continue,
                    };

                    let user = match msg.from {
                        Some(ref u) => u,
                        None => continue,
                    };

                    let is_group = matches!(msg.chat.chat_type.as_str(), "group" | "supergroup");

                    let incoming = IncomingMessage {
                        id: Uuid::new_v4(),
                        channel: "telegram".to_string(),
                        chat_id: msg.chat.id,
                        is_group,
                        message_id: msg.message_id,
                        sender: Sender {
                            id: user.id,
                            first_name: user.first_name.clone(),
                            username: user.username.clone(),
                        },
                        text: msg.text_content(),
                        timestamp: chrono::Utc::now(),
                        forward: msg.forward_info(),
                        voice: msg.voice.as_ref().map(|v| VoiceAttachment {
                            file_id: v.file_id.clone(),
                            duration: v.duration,
                            mime_type: v.mime_type.clone(),
                        }),
                    };

                    if tx.send(incoming).await.is_err() {
                        info!("telegram channel receiver dropped, stopping poll");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), MurmurError> {
        self.send_message(
            message.chat_id,
            &message.text,
            message.reply_to,
            message.markdown,
        )
        .await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), MurmurError> {
        let url = format!("{}/deleteMessage", self.base_url);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MurmurError::Channel(format!("telegram deleteMessage failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            // Bots cannot delete in chats where they lack admin rights.
            warn!("telegram deleteMessage got {status}: {error_text}");
        }

        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, MurmurError> {
        // Step 1: getFile to obtain file_path.
        let url = format!("{}/getFile?file_id={file_id}", self.base_url);
        let resp: TgResponse<TgFile> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MurmurError::Channel(format!("telegram getFile failed: {e}")))?
            .json()
            .await
            .map_err(|e| MurmurError::Channel(format!("telegram getFile parse failed: {e}")))?;

        let file_path = resp
            .result
            .and_then(|f| f.file_path)
            .ok_or_else(|| MurmurError::Channel("telegram getFile returned no file_path".into()))?;

        // Step 2: download the actual file bytes.
        let download_url = format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token
        );
        let bytes = self
            .client
            .get(&download_url)
            .send()
            .await
            .map_err(|e| MurmurError::Channel(format!("telegram file download failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| MurmurError::Channel(format!("telegram file read failed: {e}")))?;

        Ok(bytes.to_vec())
    }

    async fn stop(&self) -> Result<(), MurmurError> {
        info!("Telegram channel stopped");
        Ok(())
    }
}

/// Split a long message into chunks that respect Telegram's limit.
///
/// Chunk boundaries always fall on char boundaries; Hebrew and other
/// multi-byte text must never panic the sender.
fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if text.len() <= max_len {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let rest = &text[start..];
        if rest.len() <= max_len {
            chunks.push(rest);
            break;
        }

        // Largest char boundary within the limit.
        let mut end = max_len;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // max_len is smaller than the first character; take it whole.
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        // Prefer breaking after the last newline inside the window.
        let break_at = rest[..end].rfind('\n').map(|i| i + 1).unwrap_or(end);
        chunks.push(&rest[..break_at]);
        start += break_at;
    }

    chunks
}
