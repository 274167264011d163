//! Paginated folder listing.
//!
//! Pages are served from the store first. When a page comes up short and
//! the remote knows more messages than we do, a bounded number of header
//! fetches warms the cache under a deadline; remote trouble of any kind
//! degrades to serving whatever is cached, and only store errors surface
//! to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::adapter::{Depth, MailboxAdapter, RemoteQuery};
use crate::cache::MemoryCache;
use crate::classify::OwnershipClassifier;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::normalize::Normalizer;
use crate::store::{MessageId, MessageStore, Page};

/// A page request over one folder.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Folder to list.
    pub folder: String,
    /// Page number, 1-based.
    pub page: u64,
    /// Messages per page.
    pub page_size: usize,
    /// Restrict to messages classified to this owned address.
    pub owner: Option<String>,
}

/// Serves pages of cached messages, warming the cache from the remote
/// when it runs short.
pub struct Pager<A: MailboxAdapter> {
    adapter: Arc<A>,
    store: Arc<MessageStore>,
    cache: Arc<MemoryCache>,
    classifier: OwnershipClassifier,
    normalizer: Normalizer,
    config: Config,
}

impl<A: MailboxAdapter> Pager<A> {
    /// Creates a pager over the given adapter and store.
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
        }
    }

    /// Serves one page, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPage`] for an out-of-range request and
    /// [`Error::Database`] if the store fails. Remote failures never error;
    /// they degrade to cache-only results.
    pub async fn page(&self, request: &PageRequest) -> Result<Page> {
        if request.page == 0 {
            return Err(Error::InvalidPage("page numbers start at 1".to_string()));
        }
        if request.page_size == 0 || request.page_size > self.config.max_page_size {
            return Err(Error::InvalidPage(format!(
                "page size must be between 1 and {}",
                self.config.max_page_size
            )));
        }

        let owner = request.owner.as_deref();
        let offset = usize::try_from(request.page - 1)
            .ok()
            .and_then(|p| p.checked_mul(request.page_size))
            .ok_or_else(|| Error::InvalidPage("page number out of range".to_string()))?;

        let mut items = self
            .store
            .list(&request.folder, request.page_size, offset, owner)
            .await?;

        if items.len() < request.page_size {
            let deadline = Duration::from_secs(self.config.remote_timeout_secs);
            match tokio::time::timeout(deadline, self.warm_from_remote(&request.folder, owner))
                .await
            {
                Ok(Ok(fetched)) => {
                    if fetched > 0 {
                        debug!(folder = %request.folder, fetched, "warmed cache from remote");
                        items = self
                            .store
                            .list(&request.folder, request.page_size, offset, owner)
                            .await?;
                    }
                }
                Ok(Err(Error::Adapter(err))) => {
                    warn!(folder = %request.folder, error = %err, "remote unavailable, serving cache only");
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    warn!(folder = %request.folder, "remote deadline exceeded, serving cache only");
                }
            }
        }

        let total_count = self.store.count(&request.folder, owner).await?;
        let total_pages = total_count.div_ceil(request.page_size as u64);

        Ok(Page {
            items,
            total_count,
            total_pages,
            page: request.page,
            page_size: request.page_size,
        })
    }

    /// Fetches headers for messages the remote knows but we don't, newest
    /// first, up to the configured cap. Returns the number of remote
    /// fetches performed.
    async fn warm_from_remote(&self, folder: &str, owner: Option<&str>) -> Result<usize> {
        let query = owner.map_or(RemoteQuery::All, |o| RemoteQuery::To(o.to_string()));

        let remote_ids = match self.adapter.sort_by_date_desc(folder, &query).await? {
            Some(sorted) => sorted,
            None => {
                let mut ids = self.adapter.list_identifiers(folder, &query).await?;
                ids.reverse();
                ids
            }
        };

        let known = self.store.ids_in_folder(folder).await?;
        let is_sent = folder == self.config.sent_folder;
        let mut fetched = 0;

        for remote_id in remote_ids {
            if fetched >= self.config.fallback_fetch_cap {
                break;
            }
            let id = if is_sent {
                MessageId::sent(&remote_id)
            } else {
                MessageId::new(remote_id.clone())
            };
            if known.contains(id.as_str()) {
                continue;
            }

            // The cap bounds remote fetches, so count the attempt even if
            // the message turns out to be unparseable
            let raw = self.adapter.fetch(folder, &remote_id, Depth::Headers).await?;
            fetched += 1;

            let Ok(mut normalized) = self.normalizer.normalize(&raw, folder, id, Depth::Headers)
            else {
                continue;
            };

            normalized.meta.account = self
                .classifier
                .classify_meta(&normalized.meta)
                .map(String::from);

            self.store.upsert(&normalized.meta, None).await?;
            self.cache.insert(normalized.meta).await;
        }

        Ok(fetched)
    }
}
