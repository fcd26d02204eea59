//! Surface: one tab or window with its own cache, sync handle and notices.
//!
//! Surfaces never share cache state. They converge by refetching from the
//! backend whenever a sibling announces a change.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::cache::{KeyPattern, QueryCache, QueryData, QueryKey};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::mutations::{
    ClearCompleted, CreateCategory, CreateTodo, DeleteCategory, DeleteTodo, MutationCoordinator,
    ReorderTodos, ToggleTodo, UpdateCategory, UpdateTodo,
};
use crate::notify::{Notice, Notifier};
use crate::query::QueryClient;
use crate::remote::TodoBackend;
use crate::sync::{SurfaceId, SyncChannel, SyncHub, SyncSignal, SyncTopic};
use crate::todos::ids::{CategoryId, ProvisionalIds, TodoId};
use crate::todos::model::{
    Category, CategoryPatch, CategorySummary, InfiniteTodos, NewCategory, NewTodo, Todo,
    TodoList, TodoPatch,
};
use crate::todos::views::{self, CategoryFilter};

/// One UI surface.
#[derive(Clone)]
pub struct Surface {
    config: SyncConfig,
    client: QueryClient,
    sync: SyncChannel,
    notifier: Notifier,
    coordinator: MutationCoordinator,
    ids: Arc<ProvisionalIds>,
}

impl Surface {
    pub fn new(config: SyncConfig, backend: Arc<dyn TodoBackend>, hub: &SyncHub) -> Self {
        let client = QueryClient::new(Arc::new(QueryCache::new()), backend);
        let sync = hub.channel();
        let notifier = Notifier::new();
        let coordinator = MutationCoordinator::new(client.clone(), sync.clone(), notifier.clone());
        debug!(surface = %sync.surface(), "Surface created");
        Self {
            config,
            client,
            sync,
            notifier,
            coordinator,
            ids: Arc::new(ProvisionalIds::new()),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.sync.surface()
    }

    pub fn cache(&self) -> &QueryCache {
        self.client.cache()
    }

    pub fn sync(&self) -> &SyncChannel {
        &self.sync
    }

    /// Key of the single pending list.
    pub fn pending_key(&self) -> QueryKey {
        QueryKey::pending(self.config.pending_limit)
    }

    /// Key of the completed list starting at `offset`.
    pub fn completed_key(&self, offset: u32) -> QueryKey {
        QueryKey::completed(self.config.completed_page_size, offset)
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn pending(&self) -> Option<TodoList> {
        self.cache()
            .get(&self.pending_key())
            .and_then(|d| d.as_list().cloned())
    }

    /// The completed list as first materialized (offset 0).
    pub fn completed(&self) -> Option<InfiniteTodos> {
        self.cache()
            .get(&self.completed_key(0))
            .and_then(|d| d.as_infinite().cloned())
    }

    /// Cached categories. While the cached pending list holds every pending
    /// todo, counts follow it so optimistic changes show up in badges
    /// immediately. A truncated list keeps the server's counts.
    pub fn categories(&self) -> Option<Vec<CategorySummary>> {
        let data = self.cache().get(&QueryKey::categories())?;
        let categories = data.as_categories()?;
        Some(match self.pending() {
            Some(pending) if !pending.has_more => {
                views::with_counts(categories, pending.todos.iter())
            }
            _ => categories.to_vec(),
        })
    }

    /// Pending todos visible under `filter`.
    pub fn filtered(&self, filter: CategoryFilter) -> Vec<Todo> {
        self.pending()
            .map(|p| views::filter_by_category(p.todos.iter(), filter))
            .unwrap_or_default()
    }

    // ── Fetches ─────────────────────────────────────────────────────

    pub async fn fetch_pending(&self) -> Result<TodoList> {
        let data = self.client.fetch(self.pending_key()).await?;
        Ok(data.as_list().cloned().unwrap_or_default())
    }

    pub async fn fetch_completed(&self, offset: u32) -> Result<InfiniteTodos> {
        let data = self.client.fetch(self.completed_key(offset)).await?;
        Ok(data.as_infinite().cloned().unwrap_or_else(InfiniteTodos::empty))
    }

    /// Load the next page of a completed list. Returns whether one was loaded.
    pub async fn fetch_more_completed(&self, key: QueryKey) -> Result<bool> {
        Ok(self.client.fetch_next_page(key).await?)
    }

    pub async fn fetch_categories(&self) -> Result<Vec<CategorySummary>> {
        let data = self.client.fetch(QueryKey::categories()).await?;
        Ok(match data {
            QueryData::Categories(categories) => categories,
            _ => Vec::new(),
        })
    }

    pub async fn refetch_stale(&self) -> usize {
        self.client.refetch_stale().await
    }

    // ── Todo mutations ──────────────────────────────────────────────

    pub async fn create_todo(&self, input: NewTodo) -> Result<Todo> {
        let mutation = CreateTodo::new(
            self.pending_key(),
            self.ids.next(),
            &self.config.user_id,
            input,
        )?;
        self.coordinator.run(mutation).await
    }

    pub async fn toggle_todo(&self, id: TodoId) -> Result<Todo> {
        self.coordinator
            .run(ToggleTodo::new(self.pending_key(), id)?)
            .await
    }

    pub async fn update_todo(&self, id: TodoId, patch: TodoPatch) -> Result<Todo> {
        self.coordinator
            .run(UpdateTodo::new(self.pending_key(), id, patch)?)
            .await
    }

    pub async fn delete_todo(&self, id: TodoId) -> Result<()> {
        self.coordinator
            .run(DeleteTodo::new(self.pending_key(), id)?)
            .await
    }

    pub async fn clear_completed(&self) -> Result<()> {
        self.coordinator
            .run(ClearCompleted::new(self.pending_key()))
            .await
    }

    pub async fn reorder_todos(&self, ordered: Vec<TodoId>) -> Result<()> {
        self.coordinator
            .run(ReorderTodos::new(self.pending_key(), ordered))
            .await
    }

    // ── Category mutations ──────────────────────────────────────────

    pub async fn create_category(&self, input: NewCategory) -> Result<Category> {
        let mutation = CreateCategory::new(self.ids.next(), &self.config.user_id, input)?;
        self.coordinator.run(mutation).await
    }

    pub async fn update_category(&self, id: CategoryId, patch: CategoryPatch) -> Result<Category> {
        self.coordinator.run(UpdateCategory::new(id, patch)?).await
    }

    pub async fn delete_category(&self, id: CategoryId) -> Result<()> {
        self.coordinator
            .run(DeleteCategory::new(self.pending_key(), id)?)
            .await
    }

    // ── Sync and notices ────────────────────────────────────────────

    /// React to sibling broadcasts by refetching through this cache.
    /// Duplicate or stray hints only cost an extra refetch.
    pub fn spawn_sync_listener(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let surface = self.id();
        let mut signals = Box::pin(self.sync.stream());

        tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                let patterns = match signal {
                    SyncSignal::Changed(SyncTopic::TodoSync) => vec![KeyPattern::todo_lists()],
                    SyncSignal::Changed(SyncTopic::CategorySync) => vec![KeyPattern::categories()],
                    SyncSignal::Lagged(missed) => {
                        debug!(%surface, missed, "Missed sync hints, refetching everything");
                        vec![KeyPattern::todo_lists(), KeyPattern::categories()]
                    }
                };
                for pattern in &patterns {
                    let refreshed = client.invalidate_and_refetch(pattern).await;
                    debug!(%surface, ?signal, refreshed, "Applied sync hint");
                }
            }
            info!(%surface, "Sync listener stopped");
        })
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    pub fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }
}
