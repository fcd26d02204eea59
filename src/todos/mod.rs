//! Todo and category entities, identities, and derived views.

pub mod ids;
pub mod model;
pub mod views;

pub use ids::{CategoryId, ProvisionalIds, RecordId, TodoId};
pub use model::{
    Category, CategoryColor, CategoryPatch, CategorySummary, InfiniteTodos, ListQuery,
    NewCategory, NewTodo, Todo, TodoList, TodoPatch,
};
pub use views::CategoryFilter;
