//! Search over the cached mailbox.
//!
//! Most queries go to the full-text index. Queries the index handles
//! poorly fall back to a bounded scan over the most recent messages: text
//! below the minimum length matches too much to index usefully, and
//! non-ASCII text runs into tokenizer edge cases, so both take the scan
//! path instead of returning bad results.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{MessageStore, SearchMode, SearchResponse};

/// A search request over the cached mailbox.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Restrict to messages classified to this owned address.
    pub owner: Option<String>,
    /// Maximum hits to return.
    pub limit: usize,
}

/// Executes search requests against the store.
pub struct SearchService {
    store: Arc<MessageStore>,
    config: Config,
}

impl SearchService {
    /// Creates a service over the given store.
    #[must_use]
    pub fn new(store: Arc<MessageStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// Executes a search, choosing the index or the scan fallback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] for an empty query and
    /// [`Error::Database`] if the store fails.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".to_string()));
        }

        let owner = request.owner.as_deref();
        let started = Instant::now();

        let too_short = query.chars().count() < self.config.search_min_len;
        let non_ascii = !query.is_ascii();

        let (hits, total_matched, mode) = if too_short || non_ascii {
            // Short queries scan a tighter window and skip bodies; they
            // would otherwise match nearly everything
            let (window, include_bodies) = if too_short {
                (self.config.scan_window_short, false)
            } else {
                (self.config.scan_window, true)
            };

            let (hits, total) = self
                .store
                .scan_recent(query, owner, window, request.limit, include_bodies)
                .await?;
            (hits, total, SearchMode::RecentScan)
        } else {
            let (hits, total) = self
                .store
                .search_index(query, owner, request.limit)
                .await?;
            (hits, total, SearchMode::Indexed)
        };

        let elapsed = started.elapsed();
        debug!(
            query,
            hits = hits.len(),
            total_matched,
            ?mode,
            ?elapsed,
            "search complete"
        );

        Ok(SearchResponse {
            hits,
            total_matched,
            elapsed,
            mode,
        })
    }
}
