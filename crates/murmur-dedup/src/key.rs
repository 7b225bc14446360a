//! Dedup key derivation.

use sha2::{Digest, Sha256};

/// Derive the dedup key for a forwarded message.
///
/// When the forward carries its origin chat and message ids, the key is
/// `"{chat}:{msg}"` — `:` cannot appear in the numeric ids, so the pair is
/// unambiguous. Otherwise the key is the lowercase-hex SHA-256 of the raw
/// message text, so identical text always fingerprints identically.
pub fn compute_key(origin: Option<(i64, i64)>, text: &str) -> String {
    match origin {
        Some((chat_id, message_id)) => format!("{chat_id}:{message_id}"),
        None => hex::encode(Sha256::digest(text.as_bytes())),
    }
}
