//! Category mutations.

use async_trait::async_trait;

use super::todo::rewrite;
use super::transforms;
use super::{MutationKind, OptimisticMutation, SettleEffects, confirmed};
use crate::cache::{CacheTxn, KeyPattern, QueryData, QueryKey};
use crate::error::{RemoteError, Result};
use crate::remote::TodoBackend;
use crate::todos::ids::CategoryId;
use crate::todos::model::{Category, CategoryPatch, CategorySummary, NewCategory};

/// Rewrite the cached category list. Does nothing when it was never fetched.
fn rewrite_categories<R>(
    txn: &mut CacheTxn<'_>,
    f: impl FnOnce(&mut Vec<CategorySummary>) -> R,
) -> Option<R> {
    let key = QueryKey::categories();
    let mut categories = txn.get(&key)?.as_categories()?.to_vec();
    let result = f(&mut categories);
    txn.set(key, QueryData::Categories(categories));
    Some(result)
}

/// `category.create`: a provisional category is appended with no count.
#[derive(Debug, Clone)]
pub struct CreateCategory {
    input: NewCategory,
    placeholder: Category,
}

impl CreateCategory {
    pub fn new(placeholder_id: CategoryId, user_id: &str, input: NewCategory) -> Result<Self> {
        input.validate()?;
        let placeholder = Category::new(placeholder_id, user_id, input.name.trim(), input.color);
        Ok(Self { input, placeholder })
    }
}

#[async_trait]
impl OptimisticMutation for CreateCategory {
    type Output = Category;

    fn kind(&self) -> MutationKind {
        MutationKind::CreateCategory
    }

    fn touched(&self) -> Vec<KeyPattern> {
        vec![KeyPattern::categories()]
    }

    fn apply(&self, txn: &mut CacheTxn<'_>) {
        rewrite_categories(txn, |categories| {
            transforms::add_category(categories, CategorySummary::new(self.placeholder.clone(), 0))
        });
    }

    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<Category, RemoteError> {
        backend.create_category(self.input.clone()).await
    }

    fn reconcile(&self, created: &Category, txn: &mut CacheTxn<'_>) {
        rewrite_categories(txn, |categories| {
            if let Some(summary) = categories.iter_mut().find(|c| c.id() == self.placeholder.id) {
                summary.category = created.clone();
            }
        });
    }

    fn effects(&self) -> SettleEffects {
        SettleEffects::categories_only()
    }
}

/// `category.update`: rename or recolor in place.
#[derive(Debug, Clone)]
pub struct UpdateCategory {
    id: CategoryId,
    remote_id: i64,
    patch: CategoryPatch,
}

impl UpdateCategory {
    pub fn new(id: CategoryId, patch: CategoryPatch) -> Result<Self> {
        patch.validate()?;
        Ok(Self {
            id,
            remote_id: confirmed(id)?,
            patch,
        })
    }
}

#[async_trait]
impl OptimisticMutation for UpdateCategory {
    type Output = Category;

    fn kind(&self) -> MutationKind {
        MutationKind::UpdateCategory
    }

    fn touched(&self) -> Vec<KeyPattern> {
        vec![KeyPattern::categories()]
    }

    fn apply(&self, txn: &mut CacheTxn<'_>) {
        rewrite_categories(txn, |categories| {
            transforms::patch_category(categories, self.id, &self.patch)
        });
    }

    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<Category, RemoteError> {
        backend.update_category(self.remote_id, self.patch.clone()).await
    }

    fn effects(&self) -> SettleEffects {
        SettleEffects::categories_only()
    }
}

/// `category.delete`: drop the category; its todos become uncategorized.
#[derive(Debug, Clone)]
pub struct DeleteCategory {
    pending: QueryKey,
    id: CategoryId,
    remote_id: i64,
}

impl DeleteCategory {
    pub fn new(pending: QueryKey, id: CategoryId) -> Result<Self> {
        Ok(Self {
            pending,
            id,
            remote_id: confirmed(id)?,
        })
    }
}

#[async_trait]
impl OptimisticMutation for DeleteCategory {
    type Output = ();

    fn kind(&self) -> MutationKind {
        MutationKind::DeleteCategory
    }

    fn touched(&self) -> Vec<KeyPattern> {
        vec![
            KeyPattern::categories(),
            KeyPattern::exact(self.pending),
            KeyPattern::completed_lists(),
        ]
    }

    fn apply(&self, txn: &mut CacheTxn<'_>) {
        rewrite_categories(txn, |categories| {
            transforms::remove_category(categories, self.id)
        });
        rewrite(txn, self.pending, &self.touched(), |lists| {
            transforms::clear_category(lists, self.id)
        });
    }

    async fn commit(&self, backend: &dyn TodoBackend) -> std::result::Result<(), RemoteError> {
        backend.delete_category(self.remote_id).await
    }

    fn effects(&self) -> SettleEffects {
        SettleEffects::todos_and_counts(vec![KeyPattern::todo_lists()])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cache::QueryCache;
    use crate::error::{Error, ValidationError};
    use crate::mutations::MutationCoordinator;
    use crate::notify::Notifier;
    use crate::query::QueryClient;
    use crate::remote::MemoryBackend;
    use crate::remote::memory::BackendOp;
    use crate::sync::SyncHub;
    use crate::todos::ids::{ProvisionalIds, RecordId};
    use crate::todos::model::{CategoryColor, NewTodo, TodoList};

    const PENDING: QueryKey = QueryKey::pending(100);

    fn setup() -> (Arc<MemoryBackend>, MutationCoordinator) {
        let backend = MemoryBackend::new("u");
        let client = QueryClient::new(Arc::new(QueryCache::new()), backend.clone());
        let coordinator =
            MutationCoordinator::new(client, SyncHub::default().channel(), Notifier::new());
        (backend, coordinator)
    }

    fn categories(coordinator: &MutationCoordinator) -> Vec<CategorySummary> {
        coordinator
            .client()
            .cache()
            .get(&QueryKey::categories())
            .and_then(|d| d.as_categories().map(<[_]>::to_vec))
            .unwrap()
    }

    fn pending(coordinator: &MutationCoordinator) -> TodoList {
        coordinator
            .client()
            .cache()
            .get(&PENDING)
            .and_then(|d| d.as_list().cloned())
            .unwrap()
    }

    #[tokio::test]
    async fn create_shows_placeholder_without_badge() {
        let (backend, coordinator) = setup();
        coordinator.client().fetch(QueryKey::categories()).await.unwrap();
        backend
            .set_latency(BackendOp::CreateCategory, Duration::from_millis(100))
            .await;

        let ids = ProvisionalIds::new();
        let mutation =
            CreateCategory::new(ids.next(), "u", NewCategory::new(" Work ", CategoryColor::Blue))
                .unwrap();
        let runner = coordinator.clone();
        let task = tokio::spawn(async move { runner.run(mutation).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let optimistic = categories(&coordinator);
        assert_eq!(optimistic.len(), 1);
        assert_eq!(optimistic[0].category.name, "Work");
        assert!(optimistic[0].id().is_provisional());
        assert!(!optimistic[0].has_badge());

        let created = task.await.unwrap().unwrap();
        let settled = categories(&coordinator);
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].id(), created.id);
    }

    #[test]
    fn over_long_name_is_rejected() {
        let name = "x".repeat(51);
        let err = CreateCategory::new(
            RecordId::Provisional(1),
            "u",
            NewCategory::new(name, CategoryColor::Red),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::TooLong { max: 50, .. })
        ));
    }

    #[tokio::test]
    async fn failed_update_rolls_back() {
        let (backend, coordinator) = setup();
        let category = backend
            .seed_category(NewCategory::new("Home", CategoryColor::Green))
            .await;
        coordinator.client().fetch(QueryKey::categories()).await.unwrap();
        let before = categories(&coordinator);

        backend.fail_next(BackendOp::UpdateCategory, 1).await;
        let patch = CategoryPatch {
            name: Some("House".into()),
            color: None,
        };
        let result = coordinator
            .run(UpdateCategory::new(category.id, patch).unwrap())
            .await;

        assert!(result.is_err());
        assert_eq!(categories(&coordinator), before);
    }

    #[tokio::test]
    async fn delete_keeps_todos_and_clears_references() {
        let (backend, coordinator) = setup();
        let category = backend
            .seed_category(NewCategory::new("Errands", CategoryColor::Amber))
            .await;
        backend
            .create_todo(NewTodo::new("post letter").with_category(category.id))
            .await
            .unwrap();
        backend.seed_todo("other", false).await;
        coordinator.client().fetch(PENDING).await.unwrap();
        coordinator.client().fetch(QueryKey::categories()).await.unwrap();
        assert_eq!(categories(&coordinator)[0].count, 1);

        coordinator
            .run(DeleteCategory::new(PENDING, category.id).unwrap())
            .await
            .unwrap();

        let todos = pending(&coordinator);
        assert_eq!(todos.total, 2);
        assert!(todos.todos.iter().all(|t| t.category_id.is_none()));
        assert!(categories(&coordinator).is_empty());
        assert_eq!(backend.todos().await.len(), 2);
    }
}
