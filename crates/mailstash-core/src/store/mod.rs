//! Two-tier message storage and full-text index.

mod model;
mod repository;

pub use model::{
    AttachmentInfo, CachedMessage, MessageContent, MessageId, MessageMetadata, Page, SearchHit,
    SearchMode, SearchResponse, StoreStats,
};
pub use repository::MessageStore;
