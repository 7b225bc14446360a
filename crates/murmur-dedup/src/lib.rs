//! # murmur-dedup
//!
//! Forward deduplication store: maps (chat, content fingerprint) to the
//! first-seen message id, persisted as a flat JSON file.

pub mod key;
pub mod store;

pub use key::compute_key;
pub use store::DedupStore;
