//! Todo data model: records, list responses, and mutation inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::ids::{CategoryId, TodoId};
use crate::error::ValidationError;

/// Maximum length of a todo's text.
pub const MAX_TODO_TEXT: usize = 500;

/// Maximum length of a category name.
pub const MAX_CATEGORY_NAME: usize = 50;

/// A single to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// Confirmed server id, or provisional while a create is in flight.
    pub id: TodoId,
    /// Owner of this todo.
    pub user_id: String,
    /// User-entered text.
    pub text: String,
    /// Decides list membership: pending when false, completed when true.
    pub completed: bool,
    /// Optional free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Category reference; `None` means uncategorized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    /// When the todo was created.
    pub created_at: DateTime<Utc>,
    /// When the todo was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// Create a pending todo with the given id.
    pub fn new(id: TodoId, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            text: text.into(),
            completed: false,
            notes: None,
            category_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Placeholder shown while the server has not confirmed a create yet.
    pub fn placeholder(id: TodoId, user_id: impl Into<String>, input: &NewTodo) -> Self {
        let mut todo = Self::new(id, user_id, input.text.trim());
        todo.notes = input.notes.clone();
        todo.category_id = input.category_id;
        todo
    }

    /// Builder: set notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Builder: set category.
    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Builder: set completion state.
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Copy of this todo with the completion state flipped.
    pub fn toggled(&self) -> Self {
        let mut todo = self.clone();
        todo.completed = !todo.completed;
        todo.updated_at = Utc::now();
        todo
    }
}

/// One page of a `todo.list` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    pub todos: Vec<Todo>,
    pub total: u32,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u32>,
}

impl TodoList {
    pub fn new(todos: Vec<Todo>) -> Self {
        let total = todos.len() as u32;
        Self {
            todos,
            total,
            has_more: false,
            next_offset: None,
        }
    }

    pub fn contains(&self, id: TodoId) -> bool {
        self.todos.iter().any(|t| t.id == id)
    }

    pub fn find(&self, id: TodoId) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn find_mut(&mut self, id: TodoId) -> Option<&mut Todo> {
        self.todos.iter_mut().find(|t| t.id == id)
    }

    /// Insert at the front and count it.
    pub fn prepend(&mut self, todo: Todo) {
        self.todos.insert(0, todo);
        self.total += 1;
    }

    /// Remove by id, decrementing `total` when found.
    pub fn remove(&mut self, id: TodoId) -> Option<Todo> {
        let index = self.todos.iter().position(|t| t.id == id)?;
        self.total = self.total.saturating_sub(1);
        Some(self.todos.remove(index))
    }
}

/// A materialized infinite (paged) list: every page loaded so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfiniteTodos {
    pub pages: Vec<TodoList>,
    /// Offset each page was fetched with, parallel to `pages`.
    pub page_params: Vec<u32>,
}

impl InfiniteTodos {
    pub fn new(first: TodoList, offset: u32) -> Self {
        Self {
            pages: vec![first],
            page_params: vec![offset],
        }
    }

    /// A single empty page with no continuation.
    pub fn empty() -> Self {
        Self::new(TodoList::default(), 0)
    }

    pub fn contains(&self, id: TodoId) -> bool {
        self.pages.iter().any(|p| p.contains(id))
    }

    pub fn find(&self, id: TodoId) -> Option<&Todo> {
        self.pages.iter().find_map(|p| p.find(id))
    }

    pub fn todos(&self) -> impl Iterator<Item = &Todo> {
        self.pages.iter().flat_map(|p| p.todos.iter())
    }

    /// Offset for the next page, if the last loaded page says there is one.
    pub fn next_offset(&self) -> Option<u32> {
        let last = self.pages.last()?;
        if last.has_more { last.next_offset } else { None }
    }

    /// Append a freshly fetched page.
    pub fn push_page(&mut self, page: TodoList, offset: u32) {
        self.pages.push(page);
        self.page_params.push(offset);
    }
}

/// Parameters of a `todo.list` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub completed: bool,
    pub limit: u32,
    pub offset: u32,
}

/// Input of `todo.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    pub text: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

impl NewTodo {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            notes: None,
            category_id: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_text("text", &self.text, MAX_TODO_TEXT)
    }
}

/// Partial update of a todo.
///
/// `notes` and `category_id` are double options: `Some(None)` clears the
/// field, `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub category_id: Option<Option<CategoryId>>,
}

impl TodoPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = Some(notes);
        self
    }

    pub fn with_category(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.notes.is_none() && self.category_id.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.text {
            Some(text) => validate_text("text", text, MAX_TODO_TEXT),
            None => Ok(()),
        }
    }

    /// Apply in place and refresh `updated_at`.
    pub fn apply_to(&self, todo: &mut Todo) {
        if let Some(text) = &self.text {
            todo.text = text.trim().to_string();
        }
        if let Some(notes) = &self.notes {
            todo.notes = notes.clone();
        }
        if let Some(category_id) = self.category_id {
            todo.category_id = category_id;
        }
        todo.updated_at = Utc::now();
    }
}

/// Presentation color token of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryColor {
    Slate,
    Red,
    Orange,
    Amber,
    Green,
    Teal,
    Blue,
    Indigo,
    Purple,
    Pink,
}

/// A todo category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub user_id: String,
    pub name: String,
    pub color: CategoryColor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(
        id: CategoryId,
        user_id: impl Into<String>,
        name: impl Into<String>,
        color: CategoryColor,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            name: name.into(),
            color,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A category as listed by `category.list`, with its derived pending count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    #[serde(flatten)]
    pub category: Category,
    /// Number of non-completed todos in this category.
    pub count: u32,
}

impl CategorySummary {
    pub fn new(category: Category, count: u32) -> Self {
        Self { category, count }
    }

    pub fn id(&self) -> CategoryId {
        self.category.id
    }

    /// Zero-count categories render without a badge.
    pub fn has_badge(&self) -> bool {
        self.count > 0
    }
}

/// Input of `category.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub color: CategoryColor,
}

impl NewCategory {
    pub fn new(name: impl Into<String>, color: CategoryColor) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_text("name", &self.name, MAX_CATEGORY_NAME)
    }
}

/// Partial update of a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<CategoryColor>,
}

impl CategoryPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.name {
            Some(name) => validate_text("name", name, MAX_CATEGORY_NAME),
            None => Ok(()),
        }
    }

    pub fn apply_to(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name = name.trim().to_string();
        }
        if let Some(color) = self.color {
            category.color = color;
        }
        category.updated_at = Utc::now();
    }
}

fn validate_text(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty {
            field: field.to_string(),
        });
    }
    let length = trimmed.chars().count();
    if length > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            length,
            max,
        });
    }
    Ok(())
}

/// Distinguishes an explicit `null` (clear) from an absent field (keep).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
