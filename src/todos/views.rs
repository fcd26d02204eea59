//! Derived views over cached todo lists.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::CategoryId;
use super::model::{CategorySummary, Todo};

/// Which slice of todos a category-filtered view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CategoryFilter {
    #[default]
    All,
    Uncategorized,
    Category(CategoryId),
}

impl CategoryFilter {
    pub fn matches(&self, todo: &Todo) -> bool {
        match self {
            Self::All => true,
            Self::Uncategorized => todo.category_id.is_none(),
            Self::Category(id) => todo.category_id == Some(*id),
        }
    }
}

/// Todos visible under `filter`, preserving order.
pub fn filter_by_category<'a>(
    todos: impl IntoIterator<Item = &'a Todo>,
    filter: CategoryFilter,
) -> Vec<Todo> {
    todos
        .into_iter()
        .filter(|t| filter.matches(t))
        .cloned()
        .collect()
}

/// Recompute each category's count from a todo set. Completed todos and
/// todos pointing at unknown categories are not counted.
pub fn with_counts<'a>(
    categories: &[CategorySummary],
    todos: impl IntoIterator<Item = &'a Todo>,
) -> Vec<CategorySummary> {
    let mut counts: HashMap<CategoryId, u32> = HashMap::new();
    for todo in todos {
        if todo.completed {
            continue;
        }
        if let Some(id) = todo.category_id {
            *counts.entry(id).or_default() += 1;
        }
    }

    categories
        .iter()
        .map(|c| CategorySummary::new(c.category.clone(), counts.get(&c.id()).copied().unwrap_or(0)))
        .collect()
}
