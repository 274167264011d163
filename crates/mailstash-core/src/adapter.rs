//! Remote mailbox adapter contract.
//!
//! The engine never speaks a wire protocol directly. Everything it needs
//! from the remote side goes through [`MailboxAdapter`], so any transport
//! that can list folder identifiers and fetch raw message blobs can back
//! the cache.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a mailbox adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Could not reach the remote mailbox.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote rejected our credentials.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A remote operation failed after connecting.
    #[error("Operation failed: {0}")]
    Operation(String),
}

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// How much of a message to retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Header section only.
    Headers,
    /// Headers plus enough body to build a preview.
    Light,
    /// The complete message.
    Full,
}

/// Server-side filter applied when listing a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteQuery {
    /// Every message in the folder.
    All,
    /// Messages addressed to the given recipient.
    To(String),
}

/// Transport-agnostic view of a remote mailbox.
///
/// Implementations must be safe to share across tasks; the sync engine and
/// foreground requests call into the same adapter concurrently.
#[async_trait]
pub trait MailboxAdapter: Send + Sync {
    /// Lists message identifiers in a folder, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote mailbox cannot be reached or the
    /// folder cannot be listed.
    async fn list_identifiers(
        &self,
        folder: &str,
        query: &RemoteQuery,
    ) -> AdapterResult<Vec<String>>;

    /// Fetches a raw message blob at the requested depth.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be retrieved.
    async fn fetch(&self, folder: &str, id: &str, depth: Depth) -> AdapterResult<Vec<u8>>;

    /// Lists identifiers sorted newest first, if the remote supports
    /// server-side sorting.
    ///
    /// The default implementation reports no support; callers fall back to
    /// reversing [`list_identifiers`](Self::list_identifiers).
    ///
    /// # Errors
    ///
    /// Returns an error if the sorted listing fails.
    async fn sort_by_date_desc(
        &self,
        _folder: &str,
        _query: &RemoteQuery,
    ) -> AdapterResult<Option<Vec<String>>> {
        Ok(None)
    }
}
