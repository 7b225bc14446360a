//! Whisper speech-to-text client.

use async_trait::async_trait;
use murmur_core::{config::OpenAiConfig, error::MurmurError, traits::Transcriber};
use serde::Deserialize;
use tracing::debug;

/// Transcriber backed by the Whisper transcriptions API.
pub struct WhisperTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

/// Whisper API response.
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

impl WhisperTranscriber {
    /// Create from config values.
    pub fn from_config(config: &OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.whisper_model.clone(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, MurmurError> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("voice.ogg")
            .mime_str("audio/ogg")
            .map_err(|e| MurmurError::Provider(format!("whisper mime error: {e}")))?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);
        if !language.is_empty() {
            form = form.text("language", language.to_string());
        }

        let url = format!(
            "{}/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );
        debug!("whisper: POST {url} model={}", self.model);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MurmurError::Provider(format!("whisper request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MurmurError::Provider(format!(
                "whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = resp
            .json()
            .await
            .map_err(|e| MurmurError::Provider(format!("whisper response parse failed: {e}")))?;

        Ok(result.text)
    }
}
