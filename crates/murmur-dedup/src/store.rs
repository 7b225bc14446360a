//! JSON-file backed first-seen store.
//!
//! Persisted layout is a nested object: top-level keys are chat ids as
//! strings, each value maps dedup keys to the first-seen message id.

use murmur_core::error::MurmurError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

type ChatMap = HashMap<String, HashMap<String, i64>>;

/// Per-chat map of dedup key to first-seen message id.
///
/// Constructed once at startup and handed to the gateway. All mutation goes
/// through [`check_and_record`](DedupStore::check_and_record), which performs
/// lookup and insert as one critical section, so two in-flight handlers for
/// the same content cannot both observe "unseen".
#[derive(Clone)]
pub struct DedupStore {
    inner: Arc<Mutex<ChatMap>>,
    path: PathBuf,
}

impl DedupStore {
    /// Load the store from `path`.
    ///
    /// A missing or malformed file yields an empty store; neither blocks
    /// startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<ChatMap>(&content) {
                Ok(map) => {
                    info!(
                        "dedup store loaded from {} ({} chats)",
                        path.display(),
                        map.len()
                    );
                    map
                }
                Err(e) => {
                    warn!("dedup store at {} is malformed, starting empty: {e}", path.display());
                    ChatMap::new()
                }
            },
            Err(_) => ChatMap::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(map)),
            path,
        }
    }

    /// Look up the first-seen message id for `key` in `chat_id`.
    pub async fn lookup(&self, chat_id: i64, key: &str) -> Option<i64> {
        let map = self.inner.lock().await;
        map.get(&chat_id.to_string())?.get(key).copied()
    }

    /// Record `message_id` as the first occurrence of `key` in `chat_id`.
    ///
    /// Idempotent: if the key is already present the stored id is kept and
    /// nothing is written. A successful insert persists the full store.
    pub async fn record(
        &self,
        chat_id: i64,
        key: &str,
        message_id: i64,
    ) -> Result<(), MurmurError> {
        self.check_and_record(chat_id, key, message_id).await?;
        Ok(())
    }

    /// Atomic insert-if-absent: returns the prior first-seen id when `key`
    /// was already recorded for `chat_id`, otherwise records `message_id`
    /// and returns `None`.
    ///
    /// On persistence failure the in-memory record is retained and the error
    /// is returned so the caller can report it; the occurrence still counts
    /// as seen for the rest of the process's life.
    pub async fn check_and_record(
        &self,
        chat_id: i64,
        key: &str,
        message_id: i64,
    ) -> Result<Option<i64>, MurmurError> {
        let mut map = self.inner.lock().await;
        let chat = map.entry(chat_id.to_string()).or_default();

        if let Some(first_id) = chat.get(key) {
            return Ok(Some(*first_id));
        }

        chat.insert(key.to_string(), message_id);
        persist(&self.path, &map)?;
        Ok(None)
    }

    /// Serialize the full store to disk.
    pub async fn persist(&self) -> Result<(), MurmurError> {
        let map = self.inner.lock().await;
        persist(&self.path, &map)
    }

    /// Total number of recorded entries across all chats.
    pub async fn len(&self) -> usize {
        let map = self.inner.lock().await;
        map.values().map(|chat| chat.len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Write the serialized store via temp-file-then-rename so a crash mid-write
/// never leaves a truncated file behind.
fn persist(path: &Path, map: &ChatMap) -> Result<(), MurmurError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MurmurError::Dedup(format!("failed to create data dir: {e}")))?;
        }
    }

    let json = serde_json::to_string(map)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| MurmurError::Dedup(format!("failed to write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| MurmurError::Dedup(format!("failed to replace {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_key;

    /// Fresh store file path in the system temp dir.
    fn test_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("__murmur_dedup_{name}__.json"));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn test_record_then_lookup() {
        let store = DedupStore::load(test_path("record_lookup"));
        store.record(-100999, "100:55", 7).await.unwrap();
        assert_eq!(store.lookup(-100999, "100:55").await, Some(7));
        assert_eq!(store.lookup(-100999, "100:56").await, None);
        assert_eq!(store.lookup(-100998, "100:55").await, None);
    }

    #[tokio::test]
    async fn test_record_is_idempotent_first_writer_wins() {
        let store = DedupStore::load(test_path("idempotent"));
        store.record(-1, "k", 10).await.unwrap();
        store.record(-1, "k", 20).await.unwrap();
        assert_eq!(store.lookup(-1, "k").await, Some(10));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_check_and_record_returns_prior_id() {
        let store = DedupStore::load(test_path("check_and_record"));
        assert_eq!(store.check_and_record(-1, "k", 10).await.unwrap(), None);
        assert_eq!(store.check_and_record(-1, "k", 20).await.unwrap(), Some(10));
        assert_eq!(store.lookup(-1, "k").await, Some(10));
    }

    #[tokio::test]
    async fn test_persist_reload_round_trip() {
        let path = test_path("round_trip");
        let store = DedupStore::load(path.clone());
        store.record(-100999, "100:55", 7).await.unwrap();
        store
            .record(-100999, &compute_key(None, "hello"), 8)
            .await
            .unwrap();
        store.record(42, "9:1", 3).await.unwrap();

        let reloaded = DedupStore::load(path);
        assert_eq!(reloaded.lookup(-100999, "100:55").await, Some(7));
        assert_eq!(
            reloaded.lookup(-100999, &compute_key(None, "hello")).await,
            Some(8)
        );
        assert_eq!(reloaded.lookup(42, "9:1").await, Some(3));
        assert_eq!(reloaded.len().await, 3);
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let store = DedupStore::load(test_path("missing"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let path = test_path("corrupt");
        std::fs::write(&path, "{not json").unwrap();
        let store = DedupStore::load(path.clone());
        assert!(store.is_empty().await);

        // And an empty file.
        std::fs::write(&path, "").unwrap();
        let store = DedupStore::load(path);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_persisted_layout_is_nested_string_map() {
        let path = test_path("layout");
        let store = DedupStore::load(path.clone());
        store.record(-100999, "100:55", 7).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["-100999"]["100:55"], 7);
    }

    #[tokio::test]
    async fn test_same_key_in_different_chats_is_independent() {
        let store = DedupStore::load(test_path("per_chat"));
        assert_eq!(store.check_and_record(-1, "100:55", 5).await.unwrap(), None);
        assert_eq!(store.check_and_record(-2, "100:55", 6).await.unwrap(), None);
        assert_eq!(store.lookup(-1, "100:55").await, Some(5));
        assert_eq!(store.lookup(-2, "100:55").await, Some(6));
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_in_memory_record() {
        // Unwritable location: directory creation under /proc fails.
        let store = DedupStore::load("/proc/nonexistent/sub/dir/dedup.json");

        let result = store.check_and_record(-1, "k", 10).await;
        assert!(result.is_err());

        // The record survives in memory for the rest of the process's life.
        assert_eq!(store.lookup(-1, "k").await, Some(10));
        assert_eq!(store.check_and_record(-1, "k", 20).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_concurrent_check_and_record_single_winner() {
        let store = DedupStore::load(test_path("concurrent"));
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.check_and_record(-1, "k", 100 + i).await.unwrap()
            }));
        }

        let mut losers = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                losers += 1;
            }
        }
        // Exactly one task recorded; all others observed the winner's id.
        assert_eq!(losers, 7);
        assert_eq!(store.len().await, 1);
    }
}
