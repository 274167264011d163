//! # mailstash-core
//!
//! Remote mailbox synchronization with a two-tier local cache and
//! full-text search.
//!
//! This crate provides:
//! - A transport-agnostic [`MailboxAdapter`] seam to the remote mailbox
//! - Background synchronization with a bounded inbox window and an
//!   exhaustive sent-folder pass ([`SyncEngine`])
//! - Two-tier `SQLite` storage, header metadata plus on-demand full
//!   content, with an FTS5 index maintained in the same transactions
//!   ([`MessageStore`])
//! - Ownership classification attributing messages to configured
//!   addresses ([`OwnershipClassifier`])
//! - Cache-first pagination with bounded remote warming ([`Pager`])
//! - Indexed search with a bounded scan fallback for short and non-ASCII
//!   queries ([`SearchService`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod cache;
pub mod classify;
pub mod config;
mod error;
pub mod normalize;
pub mod page;
pub mod search;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testutil;

pub use adapter::{AdapterError, AdapterResult, Depth, MailboxAdapter, RemoteQuery};
pub use cache::MemoryCache;
pub use classify::OwnershipClassifier;
pub use config::Config;
pub use error::{Error, Result};
pub use normalize::{NormalizedMessage, Normalizer};
pub use page::{PageRequest, Pager};
pub use search::{SearchRequest, SearchService};
pub use store::{
    AttachmentInfo, CachedMessage, MessageContent, MessageId, MessageMetadata, MessageStore, Page,
    SearchHit, SearchMode, SearchResponse, StoreStats,
};
pub use sync::{ConnectionState, ConnectionStatus, StatusHandle, SyncEngine, SyncReport};
