//! Mutation coordinator: optimistic writes with snapshot, rollback and settle.
//!
//! Every mutation runs the same lifecycle:
//! 1. cancel in-flight fetches of the entries it touches
//! 2. snapshot those entries and apply the optimistic transform, atomically
//! 3. commit to the backend
//! 4. roll back on failure, then always invalidate, refetch and broadcast

pub mod category;
pub mod todo;
pub mod transforms;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{CacheTxn, KeyPattern, QueryCache, QueryData, QueryKey};
use crate::error::{Error, RemoteError, Result};
use crate::notify::{Notice, Notifier};
use crate::query::QueryClient;
use crate::remote::TodoBackend;
use crate::sync::SyncChannel;
use crate::todos::ids::RecordId;

pub use category::{CreateCategory, DeleteCategory, UpdateCategory};
pub use todo::{ClearCompleted, CreateTodo, DeleteTodo, ReorderTodos, ToggleTodo, UpdateTodo};

/// Which mutation is running. Used for logging and failure notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    CreateTodo,
    ToggleTodo,
    UpdateTodo,
    DeleteTodo,
    ClearCompleted,
    ReorderTodos,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
}

impl MutationKind {
    /// Message of the notice shown when the backend rejects the mutation.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Self::CreateTodo => "Couldn't add todo. Changes were reverted.",
            Self::ToggleTodo => "Couldn't complete todo. Changes were reverted.",
            Self::UpdateTodo => "Couldn't save todo. Changes were reverted.",
            Self::DeleteTodo => "Couldn't delete todo. Changes were reverted.",
            Self::ClearCompleted => "Couldn't clear completed todos. Changes were reverted.",
            Self::ReorderTodos => "Couldn't reorder todos. Changes were reverted.",
            Self::CreateCategory => "Couldn't add category. Changes were reverted.",
            Self::UpdateCategory => "Couldn't save category. Changes were reverted.",
            Self::DeleteCategory => "Couldn't delete category. Changes were reverted.",
        }
    }
}

/// What settling a mutation refreshes and announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleEffects {
    /// Todo list keys to invalidate and refetch.
    pub todo_keys: Vec<KeyPattern>,
    /// Refetch the category list (counts may have changed).
    pub categories: bool,
    pub broadcast_todos: bool,
    pub broadcast_categories: bool,
}

impl SettleEffects {
    /// Todo lists changed; category counts may have changed too.
    pub fn todos_and_counts(todo_keys: Vec<KeyPattern>) -> Self {
        Self {
            todo_keys,
            categories: true,
            broadcast_todos: true,
            broadcast_categories: true,
        }
    }

    /// Todo lists changed; category counts did not.
    pub fn todos_only(todo_keys: Vec<KeyPattern>) -> Self {
        Self {
            todo_keys,
            categories: false,
            broadcast_todos: true,
            broadcast_categories: false,
        }
    }

    /// Only the category list changed.
    pub fn categories_only() -> Self {
        Self {
            todo_keys: Vec::new(),
            categories: true,
            broadcast_todos: false,
            broadcast_categories: true,
        }
    }

    fn patterns(&self) -> Vec<KeyPattern> {
        let mut patterns = self.todo_keys.clone();
        if self.categories {
            patterns.push(KeyPattern::categories());
        }
        patterns
    }
}

/// Prior value of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub key: QueryKey,
    pub prior: QueryData,
}

/// Every materialized entry a mutation may rewrite, as it was before.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    /// Capture every materialized entry matching any of `patterns`. Keys
    /// matched by several patterns are captured once.
    pub fn capture(txn: &CacheTxn<'_>, patterns: &[KeyPattern]) -> Self {
        let mut captured = BTreeMap::new();
        for pattern in patterns {
            for (key, data) in txn.get_all_matching(pattern) {
                captured.entry(key).or_insert(data);
            }
        }
        Self {
            entries: captured
                .into_iter()
                .map(|(key, prior)| SnapshotEntry { key, prior })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Restore every snapshotted entry verbatim, in one transaction.
pub fn rollback(cache: &QueryCache, snapshot: &Snapshot) {
    cache.transaction(|txn| {
        for entry in &snapshot.entries {
            txn.set(entry.key, entry.prior.clone());
        }
    });
    debug!(entries = snapshot.len(), "Rolled back optimistic update");
}

/// Server id for a mutation target, rejecting ids the server has not issued.
pub(crate) fn confirmed(id: RecordId) -> Result<i64> {
    id.confirmed().ok_or(Error::ProvisionalId { id })
}

/// One optimistic write: how it rewrites the cache, how it reaches the
/// backend, and what settling it refreshes.
#[async_trait]
pub trait OptimisticMutation: Send + Sync {
    type Output: Send;

    fn kind(&self) -> MutationKind;

    /// Cache entries the transform may rewrite.
    fn touched(&self) -> Vec<KeyPattern>;

    /// Rewrite the cache to the expected post-mutation state.
    fn apply(&self, txn: &mut CacheTxn<'_>);

    /// Send the mutation to the backend.
    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<Self::Output, RemoteError>;

    /// Fold the server's answer into the cache after a successful commit.
    fn reconcile(&self, _output: &Self::Output, _txn: &mut CacheTxn<'_>) {}

    fn effects(&self) -> SettleEffects;
}

/// Runs optimistic mutations for one surface.
#[derive(Clone)]
pub struct MutationCoordinator {
    client: QueryClient,
    sync: SyncChannel,
    notifier: Notifier,
}

impl MutationCoordinator {
    pub fn new(client: QueryClient, sync: SyncChannel, notifier: Notifier) -> Self {
        Self {
            client,
            sync,
            notifier,
        }
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    /// Run `mutation` through the full lifecycle. A failed commit is rolled
    /// back and reported as a notice before the error is returned.
    pub async fn run<M: OptimisticMutation>(&self, mutation: M) -> Result<M::Output> {
        let kind = mutation.kind();
        let touched = mutation.touched();
        let cache = self.client.cache();

        for pattern in &touched {
            cache.cancel(pattern);
        }

        let snapshot = cache.transaction(|txn| {
            let snapshot = Snapshot::capture(txn, &touched);
            mutation.apply(txn);
            snapshot
        });
        debug!(?kind, entries = snapshot.len(), "Applied optimistic update");

        let result = mutation.commit(self.client.backend().as_ref()).await;
        match &result {
            Ok(output) => {
                cache.transaction(|txn| mutation.reconcile(output, txn));
                info!(?kind, "Mutation committed");
            }
            Err(e) => {
                warn!(?kind, error = %e, "Mutation failed, rolling back");
                rollback(cache, &snapshot);
                self.notifier.notify(Notice::error(kind.failure_message()));
            }
        }

        self.settle(&mutation.effects()).await;
        result.map_err(Error::from)
    }

    /// Converge the cache with the server and tell sibling surfaces.
    async fn settle(&self, effects: &SettleEffects) {
        let patterns = effects.patterns();
        let refreshed: usize = join_all(
            patterns
                .iter()
                .map(|pattern| self.client.invalidate_and_refetch(pattern)),
        )
        .await
        .into_iter()
        .sum();
        debug!(refreshed, "Settled mutation");

        if effects.broadcast_todos {
            self.sync.broadcast_todo_sync();
        }
        if effects.broadcast_categories {
            self.sync.broadcast_category_sync();
        }
    }
}
