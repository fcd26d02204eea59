//! End-to-end tests: several surfaces sharing one backend and one hub.
//!
//! Each surface has its own cache; the only thing crossing between them is
//! a payload-free sync hint followed by a refetch.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use todo_sync::config::SyncConfig;
use todo_sync::notify::NoticeLevel;
use todo_sync::remote::MemoryBackend;
use todo_sync::remote::memory::BackendOp;
use todo_sync::surface::Surface;
use todo_sync::sync::SyncHub;
use todo_sync::todos::{CategoryColor, NewCategory, NewTodo};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `check` until it holds.
async fn eventually(mut check: impl FnMut() -> bool) {
    while !check() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Two fetched surfaces with running sync listeners.
async fn two_surfaces() -> (Arc<MemoryBackend>, Surface, Surface) {
    let backend = MemoryBackend::new("u");
    let hub = SyncHub::default();
    let tab = Surface::new(SyncConfig::default(), backend.clone(), &hub);
    let navigator = Surface::new(SyncConfig::default(), backend.clone(), &hub);

    for surface in [&tab, &navigator] {
        surface.fetch_pending().await.unwrap();
        surface.fetch_completed(0).await.unwrap();
        surface.fetch_categories().await.unwrap();
        surface.spawn_sync_listener();
    }
    (backend, tab, navigator)
}

#[tokio::test]
async fn create_in_one_surface_appears_in_the_other() {
    timeout(TEST_TIMEOUT, async {
        let (_backend, tab, navigator) = two_surfaces().await;

        let created = tab.create_todo(NewTodo::new("Buy milk")).await.unwrap();

        eventually(|| {
            navigator
                .pending()
                .is_some_and(|p| p.total == 1 && p.contains(created.id))
        })
        .await;
        assert_eq!(tab.pending().unwrap().total, 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn toggle_converges_both_lists_everywhere() {
    timeout(TEST_TIMEOUT, async {
        let (backend, tab, navigator) = two_surfaces().await;
        let todo = backend.seed_todo("walk dog", false).await;
        tab.fetch_pending().await.unwrap();
        navigator.fetch_pending().await.unwrap();

        navigator.toggle_todo(todo.id).await.unwrap();

        eventually(|| {
            tab.pending().is_some_and(|p| !p.contains(todo.id))
                && tab.completed().is_some_and(|c| c.contains(todo.id))
        })
        .await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn category_delete_keeps_todos_on_every_surface() {
    timeout(TEST_TIMEOUT, async {
        let (_backend, tab, navigator) = two_surfaces().await;

        let errands = tab
            .create_category(NewCategory::new("Errands", CategoryColor::Amber))
            .await
            .unwrap();
        let todo = tab
            .create_todo(NewTodo::new("post letter").with_category(errands.id))
            .await
            .unwrap();
        eventually(|| {
            navigator
                .categories()
                .is_some_and(|c| c.len() == 1 && c[0].count == 1)
        })
        .await;

        navigator.delete_category(errands.id).await.unwrap();

        eventually(|| {
            tab.categories().is_some_and(|c| c.is_empty())
                && tab
                    .pending()
                    .and_then(|p| p.find(todo.id).cloned())
                    .is_some_and(|t| t.category_id.is_none())
        })
        .await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failed_mutation_notifies_only_its_surface() {
    timeout(TEST_TIMEOUT, async {
        let (backend, tab, navigator) = two_surfaces().await;
        let mut tab_notices = tab.notices();
        let mut navigator_notices = navigator.notices();

        backend.fail_next(BackendOp::CreateTodo, 1).await;
        assert!(tab.create_todo(NewTodo::new("lost")).await.is_err());

        let notice = tab_notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(tab.pending().unwrap().total, 0);
        assert!(navigator_notices.try_recv().is_err());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn concurrent_creates_count_only_successes() {
    timeout(TEST_TIMEOUT, async {
        let (backend, tab, navigator) = two_surfaces().await;
        backend.fail_next(BackendOp::CreateTodo, 2).await;

        let attempts = (0..6).map(|i| {
            let surface = tab.clone();
            tokio::spawn(async move { surface.create_todo(NewTodo::new(format!("todo {i}"))).await })
        });
        let mut succeeded = 0;
        for handle in attempts.collect::<Vec<_>>() {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 4);

        tab.fetch_pending().await.unwrap();
        assert_eq!(tab.pending().unwrap().total, 4);
        eventually(|| navigator.pending().is_some_and(|p| p.total == 4)).await;
    })
    .await
    .expect("test timed out");
}
