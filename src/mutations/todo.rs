//! Todo mutations.

use async_trait::async_trait;

use super::transforms::{self, TodoLists};
use super::{MutationKind, OptimisticMutation, SettleEffects, confirmed};
use crate::cache::{CacheTxn, KeyPattern, QueryKey};
use crate::error::{RemoteError, Result};
use crate::remote::TodoBackend;
use crate::todos::ids::TodoId;
use crate::todos::model::{NewTodo, Todo, TodoPatch};

/// Load the cached lists inside `scope`, rewrite them with `f`, and store
/// them back. Lists outside `scope` are neither read nor written.
pub(super) fn rewrite<R>(
    txn: &mut CacheTxn<'_>,
    pending: QueryKey,
    scope: &[KeyPattern],
    f: impl FnOnce(&mut TodoLists) -> R,
) -> R {
    let mut lists = TodoLists::load(txn, pending, scope);
    let result = f(&mut lists);
    lists.store(txn, pending);
    result
}

fn pending_and_completed(pending: QueryKey) -> Vec<KeyPattern> {
    vec![KeyPattern::exact(pending), KeyPattern::completed_lists()]
}

/// `todo.create`: a provisional placeholder goes to the top of pending.
#[derive(Debug, Clone)]
pub struct CreateTodo {
    pending: QueryKey,
    input: NewTodo,
    placeholder: Todo,
}

impl CreateTodo {
    pub fn new(
        pending: QueryKey,
        placeholder_id: TodoId,
        user_id: &str,
        input: NewTodo,
    ) -> Result<Self> {
        input.validate()?;
        if let Some(category_id) = input.category_id {
            confirmed(category_id)?;
        }
        let placeholder = Todo::placeholder(placeholder_id, user_id, &input);
        Ok(Self {
            pending,
            input,
            placeholder,
        })
    }

    pub fn placeholder(&self) -> &Todo {
        &self.placeholder
    }
}

#[async_trait]
impl OptimisticMutation for CreateTodo {
    type Output = Todo;

    fn kind(&self) -> MutationKind {
        MutationKind::CreateTodo
    }

    fn touched(&self) -> Vec<KeyPattern> {
        vec![KeyPattern::exact(self.pending)]
    }

    fn apply(&self, txn: &mut CacheTxn<'_>) {
        rewrite(txn, self.pending, &self.touched(), |lists| {
            transforms::create(lists, self.placeholder.clone())
        });
    }

    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<Todo, RemoteError> {
        backend.create_todo(self.input.clone()).await
    }

    /// Swap the placeholder for the server's record so a failed refetch
    /// never leaves a provisional id behind.
    fn reconcile(&self, created: &Todo, txn: &mut CacheTxn<'_>) {
        rewrite(txn, self.pending, &self.touched(), |lists| {
            if let Some(todo) = lists
                .pending
                .as_mut()
                .and_then(|p| p.find_mut(self.placeholder.id))
            {
                *todo = created.clone();
            }
        });
    }

    fn effects(&self) -> SettleEffects {
        SettleEffects::todos_and_counts(vec![KeyPattern::exact(self.pending)])
    }
}

/// `todo.toggle`: move a todo between the pending and completed lists.
#[derive(Debug, Clone)]
pub struct ToggleTodo {
    pending: QueryKey,
    id: TodoId,
    remote_id: i64,
}

impl ToggleTodo {
    pub fn new(pending: QueryKey, id: TodoId) -> Result<Self> {
        Ok(Self {
            pending,
            id,
            remote_id: confirmed(id)?,
        })
    }
}

#[async_trait]
impl OptimisticMutation for ToggleTodo {
    type Output = Todo;

    fn kind(&self) -> MutationKind {
        MutationKind::ToggleTodo
    }

    fn touched(&self) -> Vec<KeyPattern> {
        pending_and_completed(self.pending)
    }

    fn apply(&self, txn: &mut CacheTxn<'_>) {
        rewrite(txn, self.pending, &self.touched(), |lists| {
            transforms::toggle(lists, self.id)
        });
    }

    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<Todo, RemoteError> {
        backend.toggle_todo(self.remote_id).await
    }

    fn effects(&self) -> SettleEffects {
        SettleEffects::todos_and_counts(vec![KeyPattern::todo_lists()])
    }
}

/// `todo.update`: patch text, notes or category in place.
#[derive(Debug, Clone)]
pub struct UpdateTodo {
    pending: QueryKey,
    id: TodoId,
    remote_id: i64,
    patch: TodoPatch,
}

impl UpdateTodo {
    pub fn new(pending: QueryKey, id: TodoId, patch: TodoPatch) -> Result<Self> {
        patch.validate()?;
        if let Some(Some(category_id)) = patch.category_id {
            confirmed(category_id)?;
        }
        Ok(Self {
            pending,
            id,
            remote_id: confirmed(id)?,
            patch,
        })
    }
}

#[async_trait]
impl OptimisticMutation for UpdateTodo {
    type Output = Todo;

    fn kind(&self) -> MutationKind {
        MutationKind::UpdateTodo
    }

    fn touched(&self) -> Vec<KeyPattern> {
        pending_and_completed(self.pending)
    }

    fn apply(&self, txn: &mut CacheTxn<'_>) {
        rewrite(txn, self.pending, &self.touched(), |lists| {
            transforms::update(lists, self.id, &self.patch)
        });
    }

    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<Todo, RemoteError> {
        backend.update_todo(self.remote_id, self.patch.clone()).await
    }

    fn effects(&self) -> SettleEffects {
        let keys = vec![KeyPattern::todo_lists()];
        // Moving a todo between categories changes their counts.
        if self.patch.category_id.is_some() {
            SettleEffects::todos_and_counts(keys)
        } else {
            SettleEffects::todos_only(keys)
        }
    }
}

/// `todo.delete`: drop a todo from whichever list holds it.
#[derive(Debug, Clone)]
pub struct DeleteTodo {
    pending: QueryKey,
    id: TodoId,
    remote_id: i64,
}

impl DeleteTodo {
    pub fn new(pending: QueryKey, id: TodoId) -> Result<Self> {
        Ok(Self {
            pending,
            id,
            remote_id: confirmed(id)?,
        })
    }
}

#[async_trait]
impl OptimisticMutation for DeleteTodo {
    type Output = ();

    fn kind(&self) -> MutationKind {
        MutationKind::DeleteTodo
    }

    fn touched(&self) -> Vec<KeyPattern> {
        pending_and_completed(self.pending)
    }

    fn apply(&self, txn: &mut CacheTxn<'_>) {
        rewrite(txn, self.pending, &self.touched(), |lists| {
            transforms::delete(lists, self.id)
        });
    }

    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<(), RemoteError> {
        backend.delete_todo(self.remote_id).await
    }

    fn effects(&self) -> SettleEffects {
        SettleEffects::todos_and_counts(vec![KeyPattern::todo_lists()])
    }
}

/// `todo.clearCompleted`: empty every completed list.
#[derive(Debug, Clone)]
pub struct ClearCompleted {
    pending: QueryKey,
}

impl ClearCompleted {
    pub fn new(pending: QueryKey) -> Self {
        Self { pending }
    }
}

#[async_trait]
impl OptimisticMutation for ClearCompleted {
    type Output = ();

    fn kind(&self) -> MutationKind {
        MutationKind::ClearCompleted
    }

    fn touched(&self) -> Vec<KeyPattern> {
        vec![KeyPattern::completed_lists()]
    }

    fn apply(&self, txn: &mut CacheTxn<'_>) {
        rewrite(txn, self.pending, &self.touched(), transforms::clear_completed);
    }

    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<(), RemoteError> {
        backend.clear_completed().await
    }

    fn effects(&self) -> SettleEffects {
        SettleEffects::todos_and_counts(vec![KeyPattern::todo_lists()])
    }
}

/// `todo.reorder`: persist a new order of the pending list.
#[derive(Debug, Clone)]
pub struct ReorderTodos {
    pending: QueryKey,
    ordered: Vec<TodoId>,
}

impl ReorderTodos {
    pub fn new(pending: QueryKey, ordered: Vec<TodoId>) -> Self {
        Self { pending, ordered }
    }

    /// Ids the server knows about. Placeholders keep their cached position
    /// until the settle refetch places them.
    fn remote_ids(&self) -> Vec<i64> {
        self.ordered.iter().filter_map(|id| id.confirmed()).collect()
    }
}

#[async_trait]
impl OptimisticMutation for ReorderTodos {
    type Output = ();

    fn kind(&self) -> MutationKind {
        MutationKind::ReorderTodos
    }

    fn touched(&self) -> Vec<KeyPattern> {
        vec![KeyPattern::exact(self.pending)]
    }

    fn apply(&self, txn: &mut CacheTxn<'_>) {
        rewrite(txn, self.pending, &self.touched(), |lists| {
            transforms::reorder(lists, &self.ordered)
        });
    }

    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<(), RemoteError> {
        backend.reorder_todos(&self.remote_ids()).await
    }

    fn effects(&self) -> SettleEffects {
        SettleEffects::todos_only(vec![KeyPattern::exact(self.pending)])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cache::{QueryCache, QueryData};
    use crate::error::Error;
    use crate::mutations::MutationCoordinator;
    use crate::notify::Notifier;
    use crate::query::QueryClient;
    use crate::remote::MemoryBackend;
    use crate::remote::memory::BackendOp;
    use crate::sync::SyncHub;
    use crate::todos::ids::{ProvisionalIds, RecordId};
    use crate::todos::model::{InfiniteTodos, TodoList};

    const PENDING: QueryKey = QueryKey::pending(100);

    struct Harness {
        backend: Arc<MemoryBackend>,
        coordinator: MutationCoordinator,
        ids: ProvisionalIds,
    }

    impl Harness {
        fn new() -> Self {
            let backend = MemoryBackend::new("u");
            let client = QueryClient::new(Arc::new(QueryCache::new()), backend.clone());
            let hub = SyncHub::default();
            let coordinator = MutationCoordinator::new(client, hub.channel(), Notifier::new());
            Self {
                backend,
                coordinator,
                ids: ProvisionalIds::new(),
            }
        }

        fn cache(&self) -> &QueryCache {
            self.coordinator.client().cache()
        }

        fn pending(&self) -> TodoList {
            self.cache()
                .get(&PENDING)
                .and_then(|d| d.as_list().cloned())
                .unwrap()
        }

        fn completed(&self, key: QueryKey) -> InfiniteTodos {
            self.cache()
                .get(&key)
                .and_then(|d| d.as_infinite().cloned())
                .unwrap()
        }

        async fn create(&self, text: &str) -> Result<Todo> {
            let mutation = CreateTodo::new(PENDING, self.ids.next(), "u", NewTodo::new(text))?;
            self.coordinator.run(mutation).await
        }
    }

    #[tokio::test]
    async fn buy_milk_shows_placeholder_then_server_record() {
        let h = Harness::new();
        h.coordinator.client().fetch(PENDING).await.unwrap();
        assert_eq!(h.pending().total, 0);

        h.backend
            .set_latency(BackendOp::CreateTodo, Duration::from_millis(100))
            .await;
        let coordinator = h.coordinator.clone();
        let mutation = CreateTodo::new(PENDING, h.ids.next(), "u", NewTodo::new("Buy milk")).unwrap();
        let task = tokio::spawn(async move { coordinator.run(mutation).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let optimistic = h.pending();
        assert_eq!(optimistic.total, 1);
        assert_eq!(optimistic.todos[0].text, "Buy milk");
        assert!(optimistic.todos[0].id.as_i64() < 0);

        let created = task.await.unwrap().unwrap();
        let settled = h.pending();
        assert_eq!(settled.total, 1);
        assert_eq!(settled.todos[0].id, created.id);
        assert!(settled.todos[0].id.as_i64() > 0);
        assert_eq!(settled.todos[0].text, "Buy milk");
    }

    #[tokio::test]
    async fn failed_creates_are_not_counted() {
        let h = Harness::new();
        h.coordinator.client().fetch(PENDING).await.unwrap();

        h.create("one").await.unwrap();
        h.backend.fail_next(BackendOp::CreateTodo, 1).await;
        assert!(h.create("two").await.is_err());
        h.create("three").await.unwrap();

        let pending = h.pending();
        assert_eq!(pending.total, 2);
        assert!(pending.todos.iter().all(|t| !t.id.is_provisional()));
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_the_cache() {
        let h = Harness::new();
        h.coordinator.client().fetch(PENDING).await.unwrap();

        let err = h.create("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(h.backend.calls(BackendOp::CreateTodo).await, 0);
        assert_eq!(h.pending().total, 0);
    }

    #[tokio::test]
    async fn toggle_moves_then_settles() {
        let h = Harness::new();
        let todo = h.backend.seed_todo("walk dog", false).await;
        let completed_key = QueryKey::completed(20, 0);
        h.coordinator.client().fetch(PENDING).await.unwrap();
        h.coordinator.client().fetch(completed_key).await.unwrap();

        h.backend
            .set_latency(BackendOp::ToggleTodo, Duration::from_millis(100))
            .await;
        let coordinator = h.coordinator.clone();
        let mutation = ToggleTodo::new(PENDING, todo.id).unwrap();
        let task = tokio::spawn(async move { coordinator.run(mutation).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.pending().total, 0);
        let first_page = &h.completed(completed_key).pages[0];
        assert_eq!(first_page.total, 1);
        assert_eq!(first_page.todos[0].id, todo.id);
        assert!(first_page.todos[0].completed);

        task.await.unwrap().unwrap();
        assert_eq!(h.pending().total, 0);
        assert_eq!(h.completed(completed_key).pages[0].total, 1);

        // Toggling back restores the original membership.
        h.coordinator
            .run(ToggleTodo::new(PENDING, todo.id).unwrap())
            .await
            .unwrap();
        assert!(h.pending().contains(todo.id));
        assert_eq!(h.completed(completed_key).pages[0].total, 0);
    }

    #[tokio::test]
    async fn failed_toggle_restores_exact_lists() {
        let h = Harness::new();
        let a = h.backend.seed_todo("a", false).await;
        h.backend.seed_todo("b", false).await;
        h.backend.seed_todo("c", true).await;
        let completed_key = QueryKey::completed(20, 0);
        h.coordinator.client().fetch(PENDING).await.unwrap();
        h.coordinator.client().fetch(completed_key).await.unwrap();
        let pending_before = h.pending();
        let completed_before = h.completed(completed_key);

        h.backend.fail_next(BackendOp::ToggleTodo, 1).await;
        let result = h
            .coordinator
            .run(ToggleTodo::new(PENDING, a.id).unwrap())
            .await;

        assert!(result.is_err());
        assert_eq!(h.pending().todos, pending_before.todos);
        assert_eq!(h.pending().total, pending_before.total);
        assert_eq!(h.completed(completed_key), completed_before);
    }

    #[tokio::test]
    async fn delete_only_touches_the_sibling_that_holds_it() {
        let h = Harness::new();
        for i in 0..4 {
            h.backend.seed_todo(&format!("done {i}"), true).await;
        }
        let first = QueryKey::completed(2, 0);
        let second = QueryKey::completed(2, 2);
        h.coordinator.client().fetch(first).await.unwrap();
        h.coordinator.client().fetch(second).await.unwrap();
        let first_before = h.completed(first);
        let target = h.completed(second).pages[0].todos[0].id;
        assert!(!first_before.contains(target));

        h.backend
            .set_latency(BackendOp::DeleteTodo, Duration::from_millis(100))
            .await;
        let coordinator = h.coordinator.clone();
        let task = tokio::spawn(async move {
            coordinator
                .run(DeleteTodo::new(PENDING, target).unwrap())
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.completed(first), first_before);
        let second_now = h.completed(second);
        assert!(!second_now.contains(target));
        assert_eq!(second_now.pages[0].total, 3);

        task.await.unwrap().unwrap();
        assert_eq!(h.backend.todos().await.len(), 3);
    }

    #[tokio::test]
    async fn clear_completed_keeps_pending() {
        let h = Harness::new();
        h.backend.seed_todo("keep", false).await;
        h.backend.seed_todo("gone", true).await;
        let completed_key = QueryKey::completed(20, 0);
        h.coordinator.client().fetch(PENDING).await.unwrap();
        h.coordinator.client().fetch(completed_key).await.unwrap();
        let pending_before = h.pending();

        h.coordinator.run(ClearCompleted::new(PENDING)).await.unwrap();

        let completed = h.completed(completed_key);
        assert_eq!(completed.pages.len(), 1);
        assert_eq!(completed.pages[0].total, 0);
        assert_eq!(h.pending().todos, pending_before.todos);
    }

    #[tokio::test]
    async fn reorder_sends_only_confirmed_ids() {
        let h = Harness::new();
        let a = h.backend.seed_todo("a", false).await;
        let b = h.backend.seed_todo("b", false).await;
        h.coordinator.client().fetch(PENDING).await.unwrap();
        assert_eq!(h.pending().todos[0].id, b.id);

        let mutation = ReorderTodos::new(PENDING, vec![RecordId::Provisional(7), a.id, b.id]);
        assert_eq!(mutation.remote_ids(), vec![a.id.as_i64(), b.id.as_i64()]);
        h.coordinator.run(mutation).await.unwrap();

        let order: Vec<TodoId> = h.pending().todos.iter().map(|t| t.id).collect();
        assert_eq!(order, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn provisional_targets_never_reach_the_backend() {
        let h = Harness::new();
        let id = RecordId::Provisional(12);
        assert!(matches!(
            ToggleTodo::new(PENDING, id),
            Err(Error::ProvisionalId { .. })
        ));
        assert!(matches!(
            UpdateTodo::new(PENDING, RecordId::Confirmed(1), TodoPatch::default().with_category(Some(id))),
            Err(Error::ProvisionalId { .. })
        ));
        assert!(DeleteTodo::new(PENDING, id).is_err());
        assert_eq!(h.backend.calls(BackendOp::ToggleTodo).await, 0);
    }

    #[tokio::test]
    async fn update_patches_in_place_and_settles() {
        let h = Harness::new();
        let todo = h.backend.seed_todo("draft", false).await;
        h.coordinator.client().fetch(PENDING).await.unwrap();

        let patch = TodoPatch::text("final").with_notes(Some("checked".into()));
        let updated = h
            .coordinator
            .run(UpdateTodo::new(PENDING, todo.id, patch).unwrap())
            .await
            .unwrap();

        assert_eq!(updated.text, "final");
        let cached = h.pending();
        assert_eq!(cached.todos[0].text, "final");
        assert_eq!(cached.todos[0].notes.as_deref(), Some("checked"));
        assert!(matches!(h.cache().get(&PENDING), Some(QueryData::List(_))));
    }
}
