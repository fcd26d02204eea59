//! Optimistic transforms: what each mutation expects the server to do,
//! applied to a working copy of the cached lists.

use crate::cache::{CacheTxn, KeyPattern, QueryData, QueryKey};
use crate::todos::ids::{CategoryId, TodoId};
use crate::todos::model::{
    CategoryPatch, CategorySummary, InfiniteTodos, Todo, TodoList, TodoPatch,
};

/// Working copy of every cached todo list one transform may rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoLists {
    pub pending: Option<TodoList>,
    /// Every materialized completed list, in key order.
    pub completed: Vec<(QueryKey, InfiniteTodos)>,
}

impl TodoLists {
    /// Read the pending entry and every completed entry that `scope` covers.
    /// Entries outside `scope` are left out, so `store` never writes them.
    pub fn load(txn: &CacheTxn<'_>, pending_key: QueryKey, scope: &[KeyPattern]) -> Self {
        let in_scope = |key: &QueryKey| scope.iter().any(|p| p.matches(key));
        let pending = if in_scope(&pending_key) {
            txn.get(&pending_key).and_then(QueryData::as_list).cloned()
        } else {
            None
        };
        let completed = txn
            .get_all_matching(&KeyPattern::completed_lists())
            .into_iter()
            .filter(|(key, _)| in_scope(key))
            .filter_map(|(key, data)| match data {
                QueryData::Infinite(pages) => Some((key, pages)),
                _ => None,
            })
            .collect();
        Self { pending, completed }
    }

    /// Write the working copy back. Entries that were absent stay absent.
    pub fn store(self, txn: &mut CacheTxn<'_>, pending_key: QueryKey) {
        if let Some(pending) = self.pending {
            txn.set(pending_key, QueryData::List(pending));
        }
        for (key, pages) in self.completed {
            txn.set(key, QueryData::Infinite(pages));
        }
    }

    fn completed_pages_mut(&mut self) -> impl Iterator<Item = &mut TodoList> {
        self.completed
            .iter_mut()
            .flat_map(|(_, pages)| pages.pages.iter_mut())
    }
}

/// Direction a toggle moved a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moved {
    ToCompleted,
    ToPending,
}

/// Prepend the placeholder to the pending list.
pub fn create(lists: &mut TodoLists, placeholder: Todo) {
    if let Some(pending) = lists.pending.as_mut() {
        pending.prepend(placeholder);
    }
}

/// Move a todo to the other list. Pending is searched first; the first
/// completed page holding it decides otherwise. Unknown ids are a no-op.
pub fn toggle(lists: &mut TodoLists, id: TodoId) -> Option<Moved> {
    if let Some(todo) = lists.pending.as_mut().and_then(|p| p.remove(id)) {
        let mut done = todo.toggled();
        done.completed = true;
        for (_, pages) in lists.completed.iter_mut() {
            if let Some(first) = pages.pages.first_mut() {
                first.prepend(done.clone());
            }
        }
        return Some(Moved::ToCompleted);
    }

    let found = lists
        .completed
        .iter()
        .find_map(|(_, pages)| pages.find(id))
        .cloned()?;
    // The same todo may be materialized under several sibling keys.
    for page in lists.completed_pages_mut() {
        page.remove(id);
    }
    if let Some(pending) = lists.pending.as_mut() {
        let mut undone = found.toggled();
        undone.completed = false;
        pending.prepend(undone);
    }
    Some(Moved::ToPending)
}

/// Patch the todo wherever it is cached. Returns whether it was found.
pub fn update(lists: &mut TodoLists, id: TodoId, patch: &TodoPatch) -> bool {
    let mut found = false;
    if let Some(todo) = lists.pending.as_mut().and_then(|p| p.find_mut(id)) {
        patch.apply_to(todo);
        found = true;
    }
    for page in lists.completed_pages_mut() {
        if let Some(todo) = page.find_mut(id) {
            patch.apply_to(todo);
            found = true;
        }
    }
    found
}

/// Remove the todo wherever it is cached. Returns whether it was found.
pub fn delete(lists: &mut TodoLists, id: TodoId) -> bool {
    let mut found = lists
        .pending
        .as_mut()
        .and_then(|p| p.remove(id))
        .is_some();
    for page in lists.completed_pages_mut() {
        found |= page.remove(id).is_some();
    }
    found
}

/// Reset every completed list to one empty page.
pub fn clear_completed(lists: &mut TodoLists) {
    for (_, pages) in lists.completed.iter_mut() {
        let first_offset = pages.page_params.first().copied().unwrap_or(0);
        *pages = InfiniteTodos::new(TodoList::default(), first_offset);
    }
}

/// Reorder the pending list. Cached todos missing from `ordered` keep their
/// relative order after the listed ones; unknown ids are skipped.
pub fn reorder(lists: &mut TodoLists, ordered: &[TodoId]) {
    let Some(pending) = lists.pending.as_mut() else {
        return;
    };
    let mut remaining = std::mem::take(&mut pending.todos);
    let mut todos = Vec::with_capacity(remaining.len());
    for id in ordered {
        if let Some(index) = remaining.iter().position(|t| t.id == *id) {
            todos.push(remaining.remove(index));
        }
    }
    todos.append(&mut remaining);
    pending.todos = todos;
}

/// Clear every cached reference to a category. Returns how many todos changed.
pub fn clear_category(lists: &mut TodoLists, category_id: CategoryId) -> usize {
    let mut cleared = 0;
    let pending = lists.pending.iter_mut().map(|p| &mut p.todos);
    let completed = lists
        .completed
        .iter_mut()
        .flat_map(|(_, pages)| pages.pages.iter_mut())
        .map(|p| &mut p.todos);
    for todos in pending.chain(completed) {
        for todo in todos.iter_mut().filter(|t| t.category_id == Some(category_id)) {
            todo.category_id = None;
            cleared += 1;
        }
    }
    cleared
}

/// Append an optimistic category.
pub fn add_category(categories: &mut Vec<CategorySummary>, summary: CategorySummary) {
    categories.push(summary);
}

/// Patch a cached category. Returns whether it was found.
pub fn patch_category(
    categories: &mut [CategorySummary],
    id: CategoryId,
    patch: &CategoryPatch,
) -> bool {
    match categories.iter_mut().find(|c| c.id() == id) {
        Some(summary) => {
            patch.apply_to(&mut summary.category);
            true
        }
        None => false,
    }
}

/// Drop a cached category. Returns whether it was found.
pub fn remove_category(categories: &mut Vec<CategorySummary>, id: CategoryId) -> bool {
    let before = categories.len();
    categories.retain(|c| c.id() != id);
    categories.len() != before
}
