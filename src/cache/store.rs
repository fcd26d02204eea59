//! In-memory query cache: last known server state per query key.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::key::{KeyPattern, QueryKey};
use crate::todos::model::{CategorySummary, InfiniteTodos, TodoList};

/// Materialized result of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
    /// A single list response (the pending list).
    List(TodoList),
    /// Every page loaded so far of an infinite list (the completed list).
    Infinite(InfiniteTodos),
    /// The category list with counts.
    Categories(Vec<CategorySummary>),
}

impl QueryData {
    pub fn as_list(&self) -> Option<&TodoList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_infinite(&self) -> Option<&InfiniteTodos> {
        match self {
            Self::Infinite(pages) => Some(pages),
            _ => None,
        }
    }

    pub fn as_categories(&self) -> Option<&[CategorySummary]> {
        match self {
            Self::Categories(categories) => Some(categories),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct CacheEntry {
    data: Option<QueryData>,
    stale: bool,
    /// Bumped by `cancel`; fetches started under an older generation are dropped.
    generation: u64,
    updated_at: Option<DateTime<Utc>>,
}

/// Proof that a fetch was started; redeemed by `complete_fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: QueryKey,
    generation: u64,
}

/// Key-addressed store of the latest known data per query.
///
/// Every method is one synchronous critical section. Callers never hold the
/// lock across an `.await`, so each write is atomic with respect to other tasks.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Mutex<BTreeMap<QueryKey, CacheEntry>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<QueryKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current data for `key`. `None` means "not fetched yet".
    pub fn get(&self, key: &QueryKey) -> Option<QueryData> {
        self.transaction(|txn| txn.get(key).cloned())
    }

    /// Replace the data for `key`.
    pub fn set(&self, key: QueryKey, data: QueryData) {
        self.transaction(|txn| txn.set(key, data));
    }

    /// Rewrite the data for `key` as a function of its previous value.
    /// Returning `None` leaves the entry without data.
    pub fn update<F>(&self, key: QueryKey, f: F)
    where
        F: FnOnce(Option<&QueryData>) -> Option<QueryData>,
    {
        self.transaction(|txn| txn.update(key, f));
    }

    /// Every materialized entry whose key extends `pattern`, in key order.
    pub fn get_all_matching(&self, pattern: &KeyPattern) -> Vec<(QueryKey, QueryData)> {
        self.transaction(|txn| txn.get_all_matching(pattern))
    }

    /// Run `f` with exclusive access to the entries.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut CacheTxn<'_>) -> R) -> R {
        let mut entries = self.lock();
        let mut txn = CacheTxn {
            entries: &mut *entries,
        };
        f(&mut txn)
    }

    /// Mark matching entries stale without dropping their data.
    /// Returns the keys that now need a refetch.
    pub fn invalidate(&self, pattern: &KeyPattern) -> Vec<QueryKey> {
        let mut entries = self.lock();
        let keys: Vec<QueryKey> = entries
            .iter_mut()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, entry)| {
                entry.stale = true;
                *key
            })
            .collect();
        debug!(count = keys.len(), ?pattern, "Invalidated cache entries");
        keys
    }

    /// Suspend in-flight fetches for matching entries: any result they
    /// deliver afterwards is discarded.
    pub fn cancel(&self, pattern: &KeyPattern) -> usize {
        let mut entries = self.lock();
        let mut cancelled = 0;
        for (_, entry) in entries.iter_mut().filter(|(key, _)| pattern.matches(key)) {
            entry.generation += 1;
            cancelled += 1;
        }
        cancelled
    }

    /// Start a fetch for `key`, creating an empty entry if needed.
    pub fn begin_fetch(&self, key: QueryKey) -> FetchTicket {
        let mut entries = self.lock();
        let entry = entries.entry(key).or_default();
        FetchTicket {
            key,
            generation: entry.generation,
        }
    }

    /// Store a fetch result unless the fetch was cancelled meanwhile.
    /// Returns whether the data was written.
    pub fn complete_fetch(&self, ticket: FetchTicket, data: QueryData) -> bool {
        let mut entries = self.lock();
        let entry = entries.entry(ticket.key).or_default();
        if entry.generation != ticket.generation {
            debug!(key = %ticket.key, "Discarded result of a cancelled fetch");
            return false;
        }
        entry.data = Some(data);
        entry.stale = false;
        entry.updated_at = Some(Utc::now());
        true
    }

    /// Whether `key` was invalidated since its last successful fetch.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.lock().get(key).is_some_and(|e| e.stale)
    }

    /// When `key` last received server data.
    pub fn updated_at(&self, key: &QueryKey) -> Option<DateTime<Utc>> {
        self.lock().get(key).and_then(|e| e.updated_at)
    }

    /// Keys that currently hold data.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.lock()
            .iter()
            .filter(|(_, e)| e.data.is_some())
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().values().filter(|e| e.data.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive view of the cache for the duration of one transaction.
pub struct CacheTxn<'a> {
    entries: &'a mut BTreeMap<QueryKey, CacheEntry>,
}

impl CacheTxn<'_> {
    pub fn get(&self, key: &QueryKey) -> Option<&QueryData> {
        self.entries.get(key).and_then(|e| e.data.as_ref())
    }

    pub fn set(&mut self, key: QueryKey, data: QueryData) {
        self.entries.entry(key).or_default().data = Some(data);
    }

    pub fn update<F>(&mut self, key: QueryKey, f: F)
    where
        F: FnOnce(Option<&QueryData>) -> Option<QueryData>,
    {
        let entry = self.entries.entry(key).or_default();
        entry.data = f(entry.data.as_ref());
    }

    pub fn get_all_matching(&self, pattern: &KeyPattern) -> Vec<(QueryKey, QueryData)> {
        self.entries
            .iter()
            .filter(|(key, _)| pattern.matches(key))
            .filter_map(|(key, entry)| entry.data.clone().map(|data| (*key, data)))
            .collect()
    }
}
