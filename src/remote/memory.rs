//! In-process backend: holds todos and categories in memory.
//!
//! Behaves like the real server (positive auto-increment ids, per-list
//! ordering, derived category counts) and lets tests inject failures and
//! latency per operation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::TodoBackend;
use crate::error::RemoteError;
use crate::todos::ids::RecordId;
use crate::todos::model::{
    Category, CategoryPatch, CategorySummary, ListQuery, NewCategory, NewTodo, Todo, TodoList,
    TodoPatch,
};

/// Backend operations, used to target injected failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    ListTodos,
    CreateTodo,
    ToggleTodo,
    UpdateTodo,
    DeleteTodo,
    ClearCompleted,
    ReorderTodos,
    ListCategories,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
}

#[derive(Debug, Default)]
struct State {
    /// Display order: pending and completed lists are this order, filtered.
    todos: Vec<Todo>,
    categories: Vec<Category>,
    next_todo_id: i64,
    next_category_id: i64,
    failures: HashMap<BackendOp, u32>,
    latency: HashMap<BackendOp, Duration>,
    calls: HashMap<BackendOp, usize>,
}

/// In-memory `TodoBackend`.
pub struct MemoryBackend {
    user_id: String,
    state: RwLock<State>,
}

impl MemoryBackend {
    /// Create an empty backend for `user_id`.
    pub fn new(user_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            user_id: user_id.into(),
            state: RwLock::new(State {
                next_todo_id: 1,
                next_category_id: 1,
                ..State::default()
            }),
        })
    }

    /// Make the next `times` calls of `op` fail with `Unavailable`.
    pub async fn fail_next(&self, op: BackendOp, times: u32) {
        let mut state = self.state.write().await;
        *state.failures.entry(op).or_default() += times;
    }

    /// Delay every call of `op` by `delay`.
    pub async fn set_latency(&self, op: BackendOp, delay: Duration) {
        self.state.write().await.latency.insert(op, delay);
    }

    /// How many times `op` was called, failures included.
    pub async fn calls(&self, op: BackendOp) -> usize {
        self.state.read().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// Insert a todo directly, bypassing the call accounting.
    pub async fn seed_todo(&self, text: &str, completed: bool) -> Todo {
        let mut state = self.state.write().await;
        let id = state.next_todo_id;
        state.next_todo_id += 1;
        let todo = Todo::new(RecordId::Confirmed(id), self.user_id.clone(), text)
            .with_completed(completed);
        state.todos.insert(0, todo.clone());
        todo
    }

    /// Insert a category directly, bypassing the call accounting.
    pub async fn seed_category(&self, input: NewCategory) -> Category {
        let mut state = self.state.write().await;
        let id = state.next_category_id;
        state.next_category_id += 1;
        let category = Category::new(
            RecordId::Confirmed(id),
            self.user_id.clone(),
            input.name,
            input.color,
        );
        state.categories.push(category.clone());
        category
    }

    /// Every stored todo, in display order.
    pub async fn todos(&self) -> Vec<Todo> {
        self.state.read().await.todos.clone()
    }

    /// Count the call, apply latency, and consume an injected failure.
    async fn enter(&self, op: BackendOp) -> Result<(), RemoteError> {
        let delay = {
            let mut state = self.state.write().await;
            *state.calls.entry(op).or_default() += 1;
            state.latency.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if let Some(remaining) = state.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                warn!(?op, "Injected backend failure");
                return Err(RemoteError::Unavailable(format!("{op:?} failed")));
            }
        }
        Ok(())
    }
}

fn not_found(entity: &str, id: i64) -> RemoteError {
    RemoteError::NotFound {
        entity: entity.to_string(),
        id,
    }
}

fn rejected(operation: &str, reason: impl Into<String>) -> RemoteError {
    RemoteError::Rejected {
        operation: operation.to_string(),
        reason: reason.into(),
    }
}

impl State {
    fn todo_index(&self, id: i64) -> Result<usize, RemoteError> {
        self.todos
            .iter()
            .position(|t| t.id == RecordId::Confirmed(id))
            .ok_or_else(|| not_found("todo", id))
    }

    fn category_exists(&self, id: RecordId) -> bool {
        self.categories.iter().any(|c| c.id == id)
    }
}

#[async_trait]
impl TodoBackend for MemoryBackend {
    async fn list_todos(&self, query: ListQuery) -> Result<TodoList, RemoteError> {
        self.enter(BackendOp::ListTodos).await?;
        let state = self.state.read().await;

        let matching: Vec<&Todo> = state
            .todos
            .iter()
            .filter(|t| t.completed == query.completed)
            .collect();
        let total = matching.len() as u32;
        let todos: Vec<Todo> = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        let end = query.offset + todos.len() as u32;
        let has_more = end < total;

        debug!(
            completed = query.completed,
            offset = query.offset,
            returned = todos.len(),
            total,
            "Listed todos"
        );

        Ok(TodoList {
            todos,
            total,
            has_more,
            next_offset: has_more.then_some(end),
        })
    }

    async fn create_todo(&self, input: NewTodo) -> Result<Todo, RemoteError> {
        self.enter(BackendOp::CreateTodo).await?;
        input
            .validate()
            .map_err(|e| rejected("todo.create", e.to_string()))?;

        let mut state = self.state.write().await;
        if let Some(category_id) = input.category_id {
            if !state.category_exists(category_id) {
                return Err(not_found("category", category_id.as_i64()));
            }
        }

        let id = state.next_todo_id;
        state.next_todo_id += 1;
        let todo = Todo::placeholder(RecordId::Confirmed(id), self.user_id.clone(), &input);
        state.todos.insert(0, todo.clone());

        info!(id, text = %todo.text, "Todo created");
        Ok(todo)
    }

    async fn toggle_todo(&self, id: i64) -> Result<Todo, RemoteError> {
        self.enter(BackendOp::ToggleTodo).await?;
        let mut state = self.state.write().await;
        let index = state.todo_index(id)?;

        // A toggled todo goes to the front of the list it lands in.
        let todo = state.todos.remove(index).toggled();
        state.todos.insert(0, todo.clone());

        info!(id, completed = todo.completed, "Todo toggled");
        Ok(todo)
    }

    async fn update_todo(&self, id: i64, patch: TodoPatch) -> Result<Todo, RemoteError> {
        self.enter(BackendOp::UpdateTodo).await?;
        patch
            .validate()
            .map_err(|e| rejected("todo.update", e.to_string()))?;

        let mut state = self.state.write().await;
        if let Some(Some(category_id)) = patch.category_id {
            if !state.category_exists(category_id) {
                return Err(not_found("category", category_id.as_i64()));
            }
        }
        let index = state.todo_index(id)?;
        let todo = &mut state.todos[index];
        patch.apply_to(todo);

        info!(id, "Todo updated");
        Ok(todo.clone())
    }

    async fn delete_todo(&self, id: i64) -> Result<(), RemoteError> {
        self.enter(BackendOp::DeleteTodo).await?;
        let mut state = self.state.write().await;
        let index = state.todo_index(id)?;
        state.todos.remove(index);

        info!(id, "Todo deleted");
        Ok(())
    }

    async fn clear_completed(&self) -> Result<(), RemoteError> {
        self.enter(BackendOp::ClearCompleted).await?;
        let mut state = self.state.write().await;
        let before = state.todos.len();
        state.todos.retain(|t| !t.completed);

        info!(removed = before - state.todos.len(), "Cleared completed todos");
        Ok(())
    }

    async fn reorder_todos(&self, ids: &[i64]) -> Result<(), RemoteError> {
        self.enter(BackendOp::ReorderTodos).await?;
        let mut state = self.state.write().await;

        let (mut pending, completed): (Vec<Todo>, Vec<Todo>) =
            std::mem::take(&mut state.todos)
                .into_iter()
                .partition(|t| !t.completed);

        // Listed ids first, in the given order; anything unlisted keeps its
        // relative order after them. Unknown ids are ignored.
        let mut ordered = Vec::with_capacity(pending.len());
        for id in ids {
            if let Some(index) = pending.iter().position(|t| t.id == RecordId::Confirmed(*id)) {
                ordered.push(pending.remove(index));
            }
        }
        ordered.append(&mut pending);
        ordered.extend(completed);
        state.todos = ordered;

        info!(count = ids.len(), "Todos reordered");
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<CategorySummary>, RemoteError> {
        self.enter(BackendOp::ListCategories).await?;
        let state = self.state.read().await;

        Ok(state
            .categories
            .iter()
            .map(|c| {
                let count = state
                    .todos
                    .iter()
                    .filter(|t| !t.completed && t.category_id == Some(c.id))
                    .count() as u32;
                CategorySummary::new(c.clone(), count)
            })
            .collect())
    }

    async fn create_category(&self, input: NewCategory) -> Result<Category, RemoteError> {
        self.enter(BackendOp::CreateCategory).await?;
        input
            .validate()
            .map_err(|e| rejected("category.create", e.to_string()))?;

        let mut state = self.state.write().await;
        let id = state.next_category_id;
        state.next_category_id += 1;
        let category = Category::new(
            RecordId::Confirmed(id),
            self.user_id.clone(),
            input.name.trim(),
            input.color,
        );
        state.categories.push(category.clone());

        info!(id, name = %category.name, "Category created");
        Ok(category)
    }

    async fn update_category(&self, id: i64, patch: CategoryPatch) -> Result<Category, RemoteError> {
        self.enter(BackendOp::UpdateCategory).await?;
        patch
            .validate()
            .map_err(|e| rejected("category.update", e.to_string()))?;

        let mut state = self.state.write().await;
        let category = state
            .categories
            .iter_mut()
            .find(|c| c.id == RecordId::Confirmed(id))
            .ok_or_else(|| not_found("category", id))?;
        patch.apply_to(category);

        info!(id, "Category updated");
        Ok(category.clone())
    }

    async fn delete_category(&self, id: i64) -> Result<(), RemoteError> {
        self.enter(BackendOp::DeleteCategory).await?;
        let mut state = self.state.write().await;
        let target = RecordId::Confirmed(id);
        let index = state
            .categories
            .iter()
            .position(|c| c.id == target)
            .ok_or_else(|| not_found("category", id))?;
        state.categories.remove(index);

        let now = Utc::now();
        let mut cleared = 0;
        for todo in state.todos.iter_mut().filter(|t| t.category_id == Some(target)) {
            todo.category_id = None;
            todo.updated_at = now;
            cleared += 1;
        }

        info!(id, cleared, "Category deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todos::model::CategoryColor;

    fn query(completed: bool, limit: u32, offset: u32) -> ListQuery {
        ListQuery {
            completed,
            limit,
            offset,
        }
    }

    #[tokio::test]
    async fn create_assigns_positive_ids() {
        let backend = MemoryBackend::new("u");
        let a = backend.create_todo(NewTodo::new("a")).await.unwrap();
        let b = backend.create_todo(NewTodo::new("b")).await.unwrap();
        assert_eq!(a.id, RecordId::Confirmed(1));
        assert_eq!(b.id, RecordId::Confirmed(2));

        let pending = backend.list_todos(query(false, 10, 0)).await.unwrap();
        assert_eq!(pending.total, 2);
        assert_eq!(pending.todos[0].text, "b");
    }

    #[tokio::test]
    async fn create_rejects_blank_text() {
        let backend = MemoryBackend::new("u");
        let err = backend.create_todo(NewTodo::new("  ")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { .. }));
    }

    #[tokio::test]
    async fn list_paginates() {
        let backend = MemoryBackend::new("u");
        for i in 0..5 {
            backend.seed_todo(&format!("done {i}"), true).await;
        }

        let first = backend.list_todos(query(true, 2, 0)).await.unwrap();
        assert_eq!(first.todos.len(), 2);
        assert_eq!(first.total, 5);
        assert!(first.has_more);
        assert_eq!(first.next_offset, Some(2));

        let last = backend.list_todos(query(true, 2, 4)).await.unwrap();
        assert_eq!(last.todos.len(), 1);
        assert!(!last.has_more);
        assert_eq!(last.next_offset, None);
    }

    #[tokio::test]
    async fn toggle_moves_between_lists() {
        let backend = MemoryBackend::new("u");
        let todo = backend.seed_todo("t", false).await;

        let toggled = backend.toggle_todo(todo.id.as_i64()).await.unwrap();
        assert!(toggled.completed);
        assert_eq!(backend.list_todos(query(false, 10, 0)).await.unwrap().total, 0);
        assert_eq!(backend.list_todos(query(true, 10, 0)).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn negative_ids_are_not_found() {
        let backend = MemoryBackend::new("u");
        let err = backend.toggle_todo(-1700).await.unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reorder_appends_unlisted_and_ignores_unknown() {
        let backend = MemoryBackend::new("u");
        let a = backend.seed_todo("a", false).await;
        backend.seed_todo("b", false).await;
        let c = backend.seed_todo("c", false).await;

        backend
            .reorder_todos(&[a.id.as_i64(), 999, c.id.as_i64()])
            .await
            .unwrap();
        let texts: Vec<String> = backend
            .list_todos(query(false, 10, 0))
            .await
            .unwrap()
            .todos
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn delete_category_clears_references() {
        let backend = MemoryBackend::new("u");
        let work = backend
            .seed_category(NewCategory::new("Work", CategoryColor::Blue))
            .await;
        let todo = backend
            .create_todo(NewTodo::new("report").with_category(work.id))
            .await
            .unwrap();

        let categories = backend.list_categories().await.unwrap();
        assert_eq!(categories[0].count, 1);

        backend.delete_category(work.id.as_i64()).await.unwrap();
        let todos = backend.todos().await;
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, todo.id);
        assert!(todos[0].category_id.is_none());
        assert!(backend.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let backend = MemoryBackend::new("u");
        backend.fail_next(BackendOp::CreateTodo, 1).await;

        assert!(backend.create_todo(NewTodo::new("x")).await.is_err());
        assert!(backend.create_todo(NewTodo::new("x")).await.is_ok());
        assert_eq!(backend.calls(BackendOp::CreateTodo).await, 2);
    }

    #[tokio::test]
    async fn clear_completed_keeps_pending() {
        let backend = MemoryBackend::new("u");
        backend.seed_todo("p", false).await;
        backend.seed_todo("c1", true).await;
        backend.seed_todo("c2", true).await;

        backend.clear_completed().await.unwrap();
        let todos = backend.todos().await;
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].text, "p");
    }
}
