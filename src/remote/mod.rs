//! Remote collaborator: the todo/category backend consumed over RPC.
//!
//! The backend is the store of record. This crate only depends on the
//! `TodoBackend` trait; `MemoryBackend` implements it in-process.

pub mod memory;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::todos::model::{
    Category, CategoryPatch, CategorySummary, ListQuery, NewCategory, NewTodo, Todo, TodoList,
    TodoPatch,
};

pub use memory::MemoryBackend;

/// Backend operations the sync layer calls. Ids are confirmed server ids.
#[async_trait]
pub trait TodoBackend: Send + Sync {
    // ── Todos ───────────────────────────────────────────────────────

    /// List todos with the given completion state, one page at a time.
    async fn list_todos(&self, query: ListQuery) -> Result<TodoList, RemoteError>;

    /// Create a todo. The server assigns the id.
    async fn create_todo(&self, input: NewTodo) -> Result<Todo, RemoteError>;

    /// Flip a todo's completion state.
    async fn toggle_todo(&self, id: i64) -> Result<Todo, RemoteError>;

    /// Apply a partial update.
    async fn update_todo(&self, id: i64, patch: TodoPatch) -> Result<Todo, RemoteError>;

    /// Delete a todo.
    async fn delete_todo(&self, id: i64) -> Result<(), RemoteError>;

    /// Delete every completed todo.
    async fn clear_completed(&self) -> Result<(), RemoteError>;

    /// Persist a new order of the pending list.
    async fn reorder_todos(&self, ids: &[i64]) -> Result<(), RemoteError>;

    // ── Categories ──────────────────────────────────────────────────

    /// List categories with their pending counts.
    async fn list_categories(&self) -> Result<Vec<CategorySummary>, RemoteError>;

    /// Create a category.
    async fn create_category(&self, input: NewCategory) -> Result<Category, RemoteError>;

    /// Rename or recolor a category.
    async fn update_category(&self, id: i64, patch: CategoryPatch) -> Result<Category, RemoteError>;

    /// Delete a category. Todos referencing it become uncategorized.
    async fn delete_category(&self, id: i64) -> Result<(), RemoteError>;
}
