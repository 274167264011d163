//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the cache engine.
///
/// All fields have working defaults; a minimal deployment only needs to set
/// `owned_addresses` and `database_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Addresses this deployment receives mail for, in classification
    /// priority order. Earlier entries win when several match.
    pub owned_addresses: Vec<String>,
    /// Folder synchronized with a bounded recent window.
    pub inbox_folder: String,
    /// Folder synchronized exhaustively with full bodies.
    pub sent_folder: String,
    /// Number of most-recent inbox messages kept in sync.
    pub sync_window: usize,
    /// Seconds between successful sync cycles.
    pub sync_interval_secs: u64,
    /// Seconds to wait after a failed sync cycle.
    pub retry_backoff_secs: u64,
    /// Maximum preview length in characters.
    pub preview_len: usize,
    /// Upper bound on requested page sizes.
    pub max_page_size: usize,
    /// Maximum remote fetches performed to fill an underfilled page.
    pub fallback_fetch_cap: usize,
    /// Seconds a foreground request may wait on the remote mailbox.
    pub remote_timeout_secs: u64,
    /// Minimum query length served by the search index.
    pub search_min_len: usize,
    /// Scan window for queries below the minimum length.
    pub scan_window_short: usize,
    /// Scan window for non-ASCII queries.
    pub scan_window: usize,
    /// Path to the `SQLite` database file.
    pub database_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owned_addresses: Vec::new(),
            inbox_folder: "INBOX".to_string(),
            sent_folder: "INBOX.Sent".to_string(),
            sync_window: 50,
            sync_interval_secs: 2,
            retry_backoff_secs: 10,
            preview_len: 100,
            max_page_size: 100,
            fallback_fetch_cap: 25,
            remote_timeout_secs: 10,
            search_min_len: 2,
            scan_window_short: 200,
            scan_window: 400,
            database_path: "mailstash.db".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from a JSON string.
    ///
    /// Missing fields fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field values.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric bound is zero or a folder name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.inbox_folder.is_empty() || self.sent_folder.is_empty() {
            return Err(Error::Config("folder names must not be empty".to_string()));
        }
        if self.sync_window == 0 {
            return Err(Error::Config("sync_window must be at least 1".to_string()));
        }
        if self.max_page_size == 0 {
            return Err(Error::Config("max_page_size must be at least 1".to_string()));
        }
        if self.search_min_len == 0 {
            return Err(Error::Config(
                "search_min_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
