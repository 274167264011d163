//! Background mailbox synchronization.
//!
//! One engine owns the sync loop for a deployment: a bounded recent
//! window over the inbox at header depth, an exhaustive pass over the
//! sent folder at full depth, and a shared connectivity status other
//! services read without touching the remote themselves.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::{Depth, MailboxAdapter, RemoteQuery};
use crate::cache::MemoryCache;
use crate::classify::OwnershipClassifier;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::normalize::Normalizer;
use crate::store::{MessageContent, MessageId, MessageStore};

/// Remote connectivity as observed by the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No successful cycle yet, or the last cycle failed.
    #[default]
    Disconnected,
    /// A cycle is in flight.
    Connecting,
    /// The last cycle completed.
    Connected,
}

/// Connectivity snapshot with the last observation time and error.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// When the state last changed.
    pub last_check: Option<DateTime<Utc>>,
    /// Error message from the most recent failure, cleared on success.
    pub last_error: Option<String>,
}

/// Shared handle to the connectivity status.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<ConnectionStatus>>,
}

impl StatusHandle {
    /// Creates a handle starting in the disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current status.
    pub async fn snapshot(&self) -> ConnectionStatus {
        self.inner.read().await.clone()
    }

    /// Whether the last cycle completed.
    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.state == ConnectionState::Connected
    }

    async fn set_connecting(&self) {
        let mut status = self.inner.write().await;
        status.state = ConnectionState::Connecting;
        status.last_check = Some(Utc::now());
    }

    async fn set_connected(&self) {
        let mut status = self.inner.write().await;
        status.state = ConnectionState::Connected;
        status.last_check = Some(Utc::now());
        status.last_error = None;
    }

    async fn set_disconnected(&self, error: String) {
        let mut status = self.inner.write().await;
        status.state = ConnectionState::Disconnected;
        status.last_check = Some(Utc::now());
        status.last_error = Some(error);
    }
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    /// Messages newly written to the store.
    pub ingested: usize,
    /// Messages skipped because their headers were already cached.
    pub skipped: usize,
    /// Messages that failed to fetch or parse and were skipped.
    pub failures: usize,
}

/// Background synchronization engine.
pub struct SyncEngine<A: MailboxAdapter> {
    adapter: Arc<A>,
    store: Arc<MessageStore>,
    cache: Arc<MemoryCache>,
    classifier: OwnershipClassifier,
    normalizer: Normalizer,
    config: Config,
    status: StatusHandle,
}

impl<A: MailboxAdapter + 'static> SyncEngine<A> {
    /// Creates an engine over the given adapter and store.
    #[must_use]
    pub fn new(
        adapter: Arc<A>,
        store: Arc<MessageStore>,
        cache: Arc<MemoryCache>,
        config: Config,
    ) -> Self {
        Self {
            adapter,
            store,
            cache,
            classifier: OwnershipClassifier::new(config.owned_addresses.clone()),
            normalizer: Normalizer::new(config.preview_len),
            config,
            status: StatusHandle::new(),
        }
    }

    /// Handle to the connectivity status this engine maintains.
    #[must_use]
    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Runs the sync loop forever.
    ///
    /// A successful cycle sleeps for the configured interval; a failed one
    /// backs off longer. Failures never terminate the loop; the store
    /// keeps serving whatever was cached before the outage.
    pub async fn run(self: Arc<Self>) {
        let interval = Duration::from_secs(self.config.sync_interval_secs);
        let backoff = Duration::from_secs(self.config.retry_backoff_secs);

        loop {
            match self.cycle().await {
                Ok(report) => {
                    if report.ingested > 0 || report.failures > 0 {
                        info!(
                            ingested = report.ingested,
                            skipped = report.skipped,
                            failures = report.failures,
                            "sync cycle complete"
                        );
                    }
                    tokio::time::sleep(interval).await;
                }
                Err(err) => {
                    warn!(error = %err, "sync cycle failed, backing off");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Spawns [`run`](Self::run) on the runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs a single sync cycle: inbox window then sent folder.
    ///
    /// # Errors
    ///
    /// Returns an error if a folder listing fails or a store write fails.
    /// Per-message fetch and parse failures are counted and skipped.
    pub async fn cycle(&self) -> Result<SyncReport> {
        self.status.set_connecting().await;

        let result = self.cycle_inner().await;
        match &result {
            Ok(_) => self.status.set_connected().await,
            Err(err) => self.status.set_disconnected(err.to_string()).await,
        }
        result
    }

    async fn cycle_inner(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        // Inbox: bounded window of the most recent messages, headers only
        let inbox = self.config.inbox_folder.clone();
        let inbox_ids = self
            .adapter
            .list_identifiers(&inbox, &RemoteQuery::All)
            .await?;
        let window_start = inbox_ids.len().saturating_sub(self.config.sync_window);
        for remote_id in &inbox_ids[window_start..] {
            let id = MessageId::new(remote_id.clone());
            self.ingest(&inbox, remote_id, id, Depth::Headers, &mut report)
                .await?;
        }

        // Sent: exhaustive pass with full bodies, namespaced ids
        let sent = self.config.sent_folder.clone();
        let sent_ids = self
            .adapter
            .list_identifiers(&sent, &RemoteQuery::All)
            .await?;
        for remote_id in &sent_ids {
            let id = MessageId::sent(remote_id);
            self.ingest(&sent, remote_id, id, Depth::Full, &mut report)
                .await?;
        }

        Ok(report)
    }

    /// Fetches, normalizes, classifies, and stores one message.
    ///
    /// Skips already-cached identifiers. Fetch and parse failures are
    /// logged and counted; only store errors propagate.
    async fn ingest(
        &self,
        folder: &str,
        remote_id: &str,
        id: MessageId,
        depth: Depth,
        report: &mut SyncReport,
    ) -> Result<()> {
        if self.cache.contains(&id).await {
            report.skipped += 1;
            return Ok(());
        }

        let raw = match self.adapter.fetch(folder, remote_id, depth).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(folder, id = remote_id, error = %err, "fetch failed, skipping");
                report.failures += 1;
                return Ok(());
            }
        };

        let mut normalized = match self.normalizer.normalize(&raw, folder, id, depth) {
            Ok(normalized) => normalized,
            Err(err) => {
                warn!(folder, id = remote_id, error = %err, "unparseable message, skipping");
                report.failures += 1;
                return Ok(());
            }
        };

        normalized.meta.account = self
            .classifier
            .classify_meta(&normalized.meta)
            .map(String::from);

        self.store
            .upsert(&normalized.meta, normalized.content.as_ref())
            .await?;
        self.cache.insert(normalized.meta).await;
        report.ingested += 1;

        Ok(())
    }

    /// Fetches the full content of one message on demand and writes it
    /// through every cache tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote fetch, parse, or store write fails.
    pub async fn fetch_full(&self, folder: &str, id: &MessageId) -> Result<MessageContent> {
        let raw = self
            .adapter
            .fetch(folder, id.remote_id(), Depth::Full)
            .await?;
        let mut normalized = self
            .normalizer
            .normalize(&raw, folder, id.clone(), Depth::Full)?;

        normalized.meta.account = self
            .classifier
            .classify_meta(&normalized.meta)
            .map(String::from);

        let content = normalized
            .content
            .clone()
            .ok_or_else(|| Error::Config("full fetch produced no content".to_string()))?;

        self.store
            .upsert(&normalized.meta, normalized.content.as_ref())
            .await?;
        self.cache.insert(normalized.meta).await;

        Ok(content)
    }

    /// Fills in missing bodies for up to `limit` already-known messages.
    ///
    /// Returns the number of messages backfilled. Per-message failures are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a store query or write fails.
    pub async fn backfill_content(&self, limit: usize) -> Result<usize> {
        let missing = self.store.ids_missing_content(limit).await?;
        let mut filled = 0;

        for id in missing {
            let Some(meta) = self.store.get_metadata(&id).await? else {
                continue;
            };

            let raw = match self
                .adapter
                .fetch(&meta.folder, id.remote_id(), Depth::Full)
                .await
            {
                Ok(raw) => raw,
                Err(err) => {
                    debug!(id = %id, error = %err, "backfill fetch failed, skipping");
                    continue;
                }
            };

            let normalized = match self
                .normalizer
                .normalize(&raw, &meta.folder, id.clone(), Depth::Full)
            {
                Ok(normalized) => normalized,
                Err(err) => {
                    debug!(id = %id, error = %err, "backfill parse failed, skipping");
                    continue;
                }
            };

            if let Some(content) = normalized.content {
                self.store.upsert_content(&content).await?;
                filled += 1;
            }
        }

        Ok(filled)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testutil::{MockAdapter, raw_message};

    fn config() -> Config {
        Config {
            owned_addresses: vec!["alice@example.com".to_string()],
            sync_window: 3,
            ..Config::default()
        }
    }

    async fn engine(adapter: MockAdapter, config: Config) -> SyncEngine<MockAdapter> {
        let store = Arc::new(MessageStore::in_memory().await.unwrap());
        SyncEngine::new(
            Arc::new(adapter),
            store,
            Arc::new(MemoryCache::new()),
            config,
        )
    }

    #[tokio::test]
    async fn test_cycle_ingests_inbox_window() {
        let adapter = MockAdapter::new();
        for i in 0..5 {
            adapter.add_message(
                "INBOX",
                &format!("{i}"),
                raw_message("x@other.com", "alice@example.com", &format!("msg {i}"), ""),
            );
        }

        let engine = engine(adapter, config()).await;
        let report = engine.cycle().await.unwrap();

        // Window of 3 over 5 messages: only the newest 3 are ingested
        assert_eq!(report.ingested, 3);
        assert_eq!(engine.store.count("INBOX", None).await.unwrap(), 3);
        assert!(engine.status().is_connected().await);

        let known = engine.store.ids_in_folder("INBOX").await.unwrap();
        assert!(known.contains("4") && known.contains("2"));
        assert!(!known.contains("1"));
    }

    #[tokio::test]
    async fn test_cycle_classifies_on_ingest() {
        let adapter = MockAdapter::new();
        adapter.add_message(
            "INBOX",
            "1",
            raw_message("x@other.com", "Alice <alice@example.com>", "hello", ""),
        );

        let engine = engine(adapter, config()).await;
        engine.cycle().await.unwrap();

        let meta = engine
            .store
            .get_metadata(&MessageId::new("1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.account.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_resync_skips_cached_messages() {
        let adapter = MockAdapter::new();
        adapter.add_message(
            "INBOX",
            "1",
            raw_message("x@other.com", "alice@example.com", "hello", ""),
        );

        let engine = engine(adapter, config()).await;
        engine.cycle().await.unwrap();
        let fetches_after_first = engine.adapter.fetches();

        let report = engine.cycle().await.unwrap();
        assert_eq!(report.ingested, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(engine.adapter.fetches(), fetches_after_first);
    }

    #[tokio::test]
    async fn test_sent_messages_are_namespaced_with_content() {
        let adapter = MockAdapter::new();
        adapter.add_message(
            "INBOX.Sent",
            "7",
            raw_message("alice@example.com", "x@other.com", "re: hello", "sent body"),
        );

        let engine = engine(adapter, config()).await;
        engine.cycle().await.unwrap();

        let content = engine
            .store
            .get_content(&MessageId::sent("7"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content.body.trim(), "sent body");
        assert!(
            engine
                .store
                .get_metadata(&MessageId::new("7"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_unparseable_message_is_skipped_and_counted() {
        let adapter = MockAdapter::new();
        adapter.add_message("INBOX", "1", b"binary junk with no header lines".to_vec());
        adapter.add_message(
            "INBOX",
            "2",
            raw_message("x@other.com", "alice@example.com", "fine", ""),
        );

        let engine = engine(adapter, config()).await;
        let report = engine.cycle().await.unwrap();

        // The bad message never aborts the cycle
        assert_eq!(report.ingested, 1);
        assert_eq!(report.failures, 1);
        assert!(engine.status().is_connected().await);
    }

    #[tokio::test]
    async fn test_failed_cycle_sets_disconnected_and_keeps_cache() {
        let adapter = MockAdapter::new();
        adapter.add_message(
            "INBOX",
            "1",
            raw_message("x@other.com", "alice@example.com", "hello", ""),
        );

        let engine = engine(adapter, config()).await;
        engine.cycle().await.unwrap();
        assert!(engine.status().is_connected().await);

        engine.adapter.set_failing(true);
        for _ in 0..3 {
            assert!(engine.cycle().await.is_err());
        }

        let status = engine.status().snapshot().await;
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.last_error.is_some());
        assert!(status.last_check.is_some());

        // Cached rows remain readable during the outage
        assert_eq!(engine.store.count("INBOX", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_full_writes_through() {
        let adapter = MockAdapter::new();
        adapter.add_message(
            "INBOX",
            "1",
            raw_message("x@other.com", "alice@example.com", "hello", "the full body"),
        );

        let engine = engine(adapter, config()).await;
        let content = engine
            .fetch_full("INBOX", &MessageId::new("1"))
            .await
            .unwrap();
        assert_eq!(content.body.trim(), "the full body");

        let listed = engine.store.list("INBOX", 10, 0, None).await.unwrap();
        assert!(!listed[0].is_headers_only);
    }

    #[tokio::test]
    async fn test_backfill_content() {
        let adapter = MockAdapter::new();
        adapter.add_message(
            "INBOX",
            "1",
            raw_message("x@other.com", "alice@example.com", "hello", "late body"),
        );

        let engine = engine(adapter, config()).await;
        engine.cycle().await.unwrap();

        let listed = engine.store.list("INBOX", 10, 0, None).await.unwrap();
        assert!(listed[0].is_headers_only);

        let filled = engine.backfill_content(100).await.unwrap();
        assert_eq!(filled, 1);

        let listed = engine.store.list("INBOX", 10, 0, None).await.unwrap();
        assert_eq!(listed[0].body.trim(), "late body");
        assert_eq!(engine.backfill_content(100).await.unwrap(), 0);
    }
}
