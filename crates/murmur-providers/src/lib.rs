//! # murmur-providers
//!
//! OpenAI-backed providers: chat-completions summarization and Whisper
//! speech-to-text.

pub mod openai;
pub mod whisper;

pub use openai::OpenAiSummarizer;
pub use whisper::WhisperTranscriber;
