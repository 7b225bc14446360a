//! # murmur-channels
//!
//! Messaging platform integration for Murmur.

pub mod telegram;

pub use telegram::TelegramChannel;
