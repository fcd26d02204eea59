//! Query fetching: loads cache entries from the backend and reconciles
//! invalidated ones.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::cache::{Entity, KeyPattern, QueryCache, QueryData, QueryKey};
use crate::error::RemoteError;
use crate::remote::TodoBackend;
use crate::todos::model::{InfiniteTodos, ListQuery};

/// Reads the backend on behalf of one surface's cache.
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<QueryCache>,
    backend: Arc<dyn TodoBackend>,
}

impl QueryClient {
    pub fn new(cache: Arc<QueryCache>, backend: Arc<dyn TodoBackend>) -> Self {
        Self { cache, backend }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn backend(&self) -> &Arc<dyn TodoBackend> {
        &self.backend
    }

    /// Fetch `key` from the backend and store it, unless a mutation
    /// cancelled the fetch while it was in flight.
    pub async fn fetch(&self, key: QueryKey) -> Result<QueryData, RemoteError> {
        let ticket = self.cache.begin_fetch(key);
        let data = self.load(key).await?;
        if self.cache.complete_fetch(ticket, data.clone()) {
            debug!(%key, "Fetched query");
        }
        Ok(data)
    }

    /// Load the next page of an infinite list. Returns `false` when there
    /// is no further page or the entry has not been fetched yet.
    pub async fn fetch_next_page(&self, key: QueryKey) -> Result<bool, RemoteError> {
        let Some(QueryData::Infinite(current)) = self.cache.get(&key) else {
            return Ok(false);
        };
        let Some(offset) = current.next_offset() else {
            return Ok(false);
        };

        let ticket = self.cache.begin_fetch(key);
        let page = self
            .backend
            .list_todos(ListQuery {
                completed: true,
                limit: key.input.limit.unwrap_or_default(),
                offset,
            })
            .await?;

        let mut next = current;
        next.push_page(page, offset);
        Ok(self.cache.complete_fetch(ticket, QueryData::Infinite(next)))
    }

    /// Mark matching entries stale and refetch them concurrently. Failures
    /// leave the entry stale; the next successful refetch converges it.
    pub async fn invalidate_and_refetch(&self, pattern: &KeyPattern) -> usize {
        let keys = self.cache.invalidate(pattern);
        self.refetch(keys).await
    }

    /// Refetch every entry currently marked stale.
    pub async fn refetch_stale(&self) -> usize {
        let keys: Vec<QueryKey> = self
            .cache
            .keys()
            .into_iter()
            .filter(|k| self.cache.is_stale(k))
            .collect();
        self.refetch(keys).await
    }

    async fn refetch(&self, keys: Vec<QueryKey>) -> usize {
        let results = join_all(keys.iter().map(|key| self.fetch(*key))).await;
        let mut refreshed = 0;
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(_) => refreshed += 1,
                Err(e) => warn!(%key, error = %e, "Refetch failed, keeping stale data"),
            }
        }
        refreshed
    }

    async fn load(&self, key: QueryKey) -> Result<QueryData, RemoteError> {
        match key.entity {
            Entity::Category => Ok(QueryData::Categories(
                self.backend.list_categories().await?,
            )),
            Entity::Todo if key.is_completed_list() => self.load_infinite(key).await,
            Entity::Todo => {
                let list = self
                    .backend
                    .list_todos(ListQuery {
                        completed: key.input.completed.unwrap_or(false),
                        limit: key.input.limit.unwrap_or_default(),
                        offset: key.input.offset.unwrap_or(0),
                    })
                    .await?;
                Ok(QueryData::List(list))
            }
        }
    }

    /// Reload every page the entry had, starting from its first offset.
    async fn load_infinite(&self, key: QueryKey) -> Result<QueryData, RemoteError> {
        let loaded_pages = match self.cache.get(&key) {
            Some(QueryData::Infinite(pages)) => pages.pages.len().max(1),
            _ => 1,
        };
        let limit = key.input.limit.unwrap_or_default();
        let mut offset = key.input.offset.unwrap_or(0);
        let mut result: Option<InfiniteTodos> = None;

        for _ in 0..loaded_pages {
            let page = self
                .backend
                .list_todos(ListQuery {
                    completed: true,
                    limit,
                    offset,
                })
                .await?;
            let next = if page.has_more { page.next_offset } else { None };
            match result.as_mut() {
                Some(pages) => pages.push_page(page, offset),
                None => result = Some(InfiniteTodos::new(page, offset)),
            }
            match next {
                Some(n) => offset = n,
                None => break,
            }
        }

        Ok(QueryData::Infinite(result.unwrap_or_else(InfiniteTodos::empty)))
    }
}
