use crate::{
    error::MurmurError,
    message::{IncomingMessage, OutgoingMessage},
};
use async_trait::async_trait;

/// Messaging channel trait.
///
/// The messaging platform (Telegram) implements this trait to deliver
/// message events and perform chat operations on behalf of the gateway.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    /// Returns a receiver that yields incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, MurmurError>;

    /// Send a message through this channel.
    async fn send(&self, message: OutgoingMessage) -> Result<(), MurmurError>;

    /// Delete a message from a chat.
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), MurmurError>;

    /// Download a binary attachment by its platform file handle.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, MurmurError>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), MurmurError>;
}

/// Speech-to-text provider trait.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Transcribe audio bytes with a language hint (e.g. "he").
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, MurmurError>;
}

/// Text summarization provider trait.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Summarize the given message text, translating if needed.
    async fn summarize(&self, text: &str) -> Result<String, MurmurError>;

    /// Check if the provider is reachable and ready.
    async fn is_available(&self) -> bool;
}
