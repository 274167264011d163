//! Storage data models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable cache identifier for a message.
///
/// Inbox messages keep their remote identifier verbatim; sent messages are
/// namespaced with a `sent_` prefix so the two folders can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    /// Wraps a remote inbox identifier.
    #[must_use]
    pub fn new(remote_id: impl Into<String>) -> Self {
        Self(remote_id.into())
    }

    /// Namespaces a remote sent-folder identifier.
    #[must_use]
    pub fn sent(remote_id: &str) -> Self {
        Self(format!("sent_{remote_id}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strips the sent-folder namespace, returning the remote identifier.
    ///
    /// Returns the id unchanged when it carries no namespace.
    #[must_use]
    pub fn remote_id(&self) -> &str {
        self.0.strip_prefix("sent_").unwrap_or(&self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Message header metadata, the always-present cache tier.
#[derive(Debug, Clone)]
pub struct MessageMetadata {
    /// Cache identifier.
    pub id: MessageId,
    /// Folder the message lives in.
    pub folder: String,
    /// Decoded subject.
    pub subject: String,
    /// Decoded From header.
    pub from: String,
    /// Decoded To header.
    pub to: String,
    /// Decoded Cc header.
    pub cc: String,
    /// Decoded Bcc header.
    pub bcc: String,
    /// Raw Date header.
    pub date: String,
    /// Unix timestamp parsed from the Date header.
    pub timestamp: i64,
    /// Raw Message-ID header.
    pub message_id: String,
    /// Owning account address, when classification matched.
    pub account: Option<String>,
    /// Whether the message carries attachments.
    pub has_attachments: bool,
    /// When this row was written.
    pub cached_at: DateTime<Utc>,
}

/// Attachment descriptor stored alongside message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// Attachment filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Decoded size in bytes.
    pub size: u64,
}

/// Full message content, the on-demand cache tier.
#[derive(Debug, Clone)]
pub struct MessageContent {
    /// Cache identifier.
    pub id: MessageId,
    /// Folder the message lives in.
    pub folder: String,
    /// Plain text body.
    pub body: String,
    /// HTML body, when present.
    pub html_body: Option<String>,
    /// Attachment descriptors.
    pub attachments: Vec<AttachmentInfo>,
    /// When this row was written.
    pub cached_at: DateTime<Utc>,
}

/// A message as served from the cache, metadata joined with whatever
/// content tier exists.
#[derive(Debug, Clone)]
pub struct CachedMessage {
    /// Header metadata.
    pub meta: MessageMetadata,
    /// Plain text body, empty when only headers are cached.
    pub body: String,
    /// HTML body, when cached.
    pub html_body: Option<String>,
    /// True when no content row exists yet.
    pub is_headers_only: bool,
}

/// One page of cached messages.
#[derive(Debug, Clone)]
pub struct Page {
    /// Messages on this page, newest first.
    pub items: Vec<CachedMessage>,
    /// Total messages matching the request.
    pub total_count: u64,
    /// Total pages at the requested page size.
    pub total_pages: u64,
    /// Requested page number, 1-based.
    pub page: u64,
    /// Requested page size.
    pub page_size: usize,
}

/// A single search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Cache identifier.
    pub id: MessageId,
    /// Folder the message lives in.
    pub folder: String,
    /// Decoded subject.
    pub subject: String,
    /// Decoded From header.
    pub from: String,
    /// Decoded To header.
    pub to: String,
    /// Unix timestamp.
    pub timestamp: i64,
    /// Owning account address, when classified.
    pub account: Option<String>,
    /// Highlighted excerpt around the match.
    pub excerpt: String,
}

/// How a search request was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Served by the full-text index.
    Indexed,
    /// Served by a bounded scan over recent messages.
    RecentScan,
}

/// Search results with execution details.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// Matching messages, newest first.
    pub hits: Vec<SearchHit>,
    /// Total matches before the limit was applied.
    pub total_matched: u64,
    /// Wall-clock execution time.
    pub elapsed: std::time::Duration,
    /// Execution path taken.
    pub mode: SearchMode,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Metadata rows.
    pub metadata_count: u64,
    /// Content rows.
    pub content_count: u64,
    /// Full-text index rows.
    pub indexed_count: u64,
}
