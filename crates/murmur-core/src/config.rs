use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MurmurError;

/// Top-level Murmur configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub murmur: MurmurConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MurmurConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for MurmurConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Telegram bot config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Chat id that receives failure notifications. Kept as a string so it
    /// can come straight from an env var; parsed at startup.
    #[serde(default)]
    pub error_chat_id: String,
}

/// OpenAI API config, shared by the summarizer and the Whisper transcriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Language hint for transcription and summary target language.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_openai_model(),
            whisper_model: default_whisper_model(),
            base_url: default_openai_base_url(),
            language: default_language(),
        }
    }
}

/// Forward deduplication config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path of the persisted store file.
    #[serde(default = "default_dedup_path")]
    pub path: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_dedup_path(),
        }
    }
}

/// User-facing message templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Summarization prompt. `{text}` is replaced with the forwarded text.
    #[serde(default = "default_summary_prompt")]
    pub summary_prompt: String,
    /// Duplicate-forward notice. `{mention}` and `{link}` are replaced.
    #[serde(default = "default_duplicate_notice")]
    pub duplicate_notice: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            summary_prompt: default_summary_prompt(),
            duplicate_notice: default_duplicate_notice(),
        }
    }
}

// --- Default value functions ---

fn default_name() -> String {
    "Murmur".to_string()
}
fn default_data_dir() -> String {
    "~/.murmur".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_openai_model() -> String {
    "gpt-4o".to_string()
}
fn default_whisper_model() -> String {
    "whisper-1".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_language() -> String {
    "he".to_string()
}
fn default_dedup_path() -> String {
    "~/.murmur/forward_dedup.json".to_string()
}
fn default_summary_prompt() -> String {
    "Analyze the following message. If it is not mostly in Hebrew or English, \
     first translate it to Hebrew. Then provide a short summary in Hebrew, \
     removing credit tags, links or requests to follow or reply.\n\n\
     Message:\n{text}"
        .to_string()
}
fn default_duplicate_notice() -> String {
    "{mention} this was already forwarded here: {link}".to_string()
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Secrets left empty in
/// the file are filled from `TELEGRAM_BOT_TOKEN`, `OPENAI_API_KEY`, and
/// `MURMUR_ERROR_CHAT_ID` env vars.
pub fn load(path: &str) -> Result<Config, MurmurError> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MurmurError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| MurmurError::Config(format!("failed to parse config: {e}")))?
    } else {
        tracing::info!("Config file not found at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Fill empty secret fields from environment variables.
fn apply_env_overrides(config: &mut Config) {
    if config.telegram.bot_token.is_empty() {
        if let Ok(v) = std::env::var("TELEGRAM_BOT_TOKEN") {
            config.telegram.bot_token = v;
        }
    }
    if config.openai.api_key.is_empty() {
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            config.openai.api_key = v;
        }
    }
    if config.telegram.error_chat_id.is_empty() {
        if let Ok(v) = std::env::var("MURMUR_ERROR_CHAT_ID") {
            config.telegram.error_chat_id = v;
        }
    }
}
