use thiserror::Error;

/// Top-level error type for Murmur.
#[derive(Debug, Error)]
pub enum MurmurError {
    /// Error from the messaging channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Error from a transcription or summarization provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Error from the forward deduplication store.
    #[error("dedup error: {0}")]
    Dedup(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
