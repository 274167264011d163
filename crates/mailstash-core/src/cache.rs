//! In-process metadata cache.
//!
//! The sync loop consults this before touching the remote mailbox, so a
//! message whose headers are already known costs nothing per cycle. One
//! lock guards the whole map; every access goes through it.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::store::{MessageId, MessageMetadata};

/// Shared in-memory cache of message metadata, keyed by cache identifier.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MessageMetadata>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether an identifier is cached.
    pub async fn contains(&self, id: &MessageId) -> bool {
        self.entries.read().await.contains_key(id.as_str())
    }

    /// Inserts or replaces an entry.
    pub async fn insert(&self, meta: MessageMetadata) {
        self.entries
            .write()
            .await
            .insert(meta.id.as_str().to_string(), meta);
    }

    /// Returns a clone of the cached metadata, if present.
    pub async fn get(&self, id: &MessageId) -> Option<MessageMetadata> {
        self.entries.read().await.get(id.as_str()).cloned()
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn meta(id: &str) -> MessageMetadata {
        MessageMetadata {
            id: MessageId::new(id),
            folder: "INBOX".to_string(),
            subject: "s".to_string(),
            from: String::new(),
            to: String::new(),
            cc: String::new(),
            bcc: String::new(),
            date: String::new(),
            timestamp: 0,
            message_id: String::new(),
            account: None,
            has_attachments: false,
            cached_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_contains_get() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty().await);

        cache.insert(meta("1")).await;
        assert!(cache.contains(&MessageId::new("1")).await);
        assert!(!cache.contains(&MessageId::new("2")).await);
        assert_eq!(cache.get(&MessageId::new("1")).await.unwrap().subject, "s");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_replaces() {
        let cache = MemoryCache::new();
        cache.insert(meta("1")).await;
        let mut updated = meta("1");
        updated.subject = "updated".to_string();
        cache.insert(updated).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(
            cache.get(&MessageId::new("1")).await.unwrap().subject,
            "updated"
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        cache.insert(meta("1")).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
