//! In-memory query source
//!
//! [`MemoryStore`] keeps one keyed, ordered table behind a read-write lock.
//! It implements [`QuerySource`] with snapshots that hold the read lock, and
//! publishes its resource tag to a [`MutationTracker`] after each write has
//! released the write lock, so subscribers are only told about data they can
//! already read.

use crate::error::Result;
use crate::source::{QuerySource, RowReader};
use crate::tracker::MutationTracker;
use parking_lot::{RwLock, RwLockReadGuard};
use rowpager_types::ResourceTag;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

type Filter<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// A named filter over a [`MemoryStore`]; rows keep the store's key order.
///
/// Two queries are the same predicate when their names are equal.
pub struct MemoryQuery<R> {
    name: String,
    filter: Filter<R>,
}

impl<R> MemoryQuery<R> {
    pub fn new<F>(name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        MemoryQuery {
            name: name.into(),
            filter: Arc::new(filter),
        }
    }

    /// Every row, in key order
    pub fn all() -> Self {
        Self::new("all", |_| true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, row: &R) -> bool {
        (self.filter)(row)
    }
}

impl<R> Clone for MemoryQuery<R> {
    fn clone(&self) -> Self {
        MemoryQuery {
            name: self.name.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<R> PartialEq for MemoryQuery<R> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<R> Eq for MemoryQuery<R> {}

impl<R> Hash for MemoryQuery<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<R> fmt::Debug for MemoryQuery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MemoryQuery").field(&self.name).finish()
    }
}

fn count_matching<R>(rows: &BTreeMap<u64, R>, query: &MemoryQuery<R>) -> usize {
    rows.values().filter(|row| query.matches(row)).count()
}

fn window_matching<R: Clone>(
    rows: &BTreeMap<u64, R>,
    query: &MemoryQuery<R>,
    offset: usize,
    limit: usize,
) -> Vec<R> {
    rows.values()
        .filter(|row| query.matches(row))
        .skip(offset)
        .take(limit)
        .cloned()
        .collect()
}

/// An ordered in-memory table
pub struct MemoryStore<R> {
    tag: ResourceTag,
    rows: RwLock<BTreeMap<u64, R>>,
    tracker: Option<MutationTracker>,
}

impl<R: Clone> MemoryStore<R> {
    /// A store whose writes are not published anywhere
    pub fn new(tag: impl Into<ResourceTag>) -> Self {
        MemoryStore {
            tag: tag.into(),
            rows: RwLock::new(BTreeMap::new()),
            tracker: None,
        }
    }

    /// Publish this store's tag to `tracker` after every write
    pub fn tracked_by(mut self, tracker: MutationTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn tag(&self) -> &ResourceTag {
        &self.tag
    }

    pub fn insert(&self, key: u64, row: R) -> Option<R> {
        let previous = self.rows.write().insert(key, row);
        self.publish();
        previous
    }

    pub fn remove(&self, key: u64) -> Option<R> {
        let removed = self.rows.write().remove(&key);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Modify a row in place; returns false if `key` is absent
    pub fn update<F: FnOnce(&mut R)>(&self, key: u64, f: F) -> bool {
        let updated = match self.rows.write().get_mut(&key) {
            Some(row) => {
                f(row);
                true
            }
            None => false,
        };
        if updated {
            self.publish();
        }
        updated
    }

    /// Run a multi-row write under one lock.
    ///
    /// `f` returns whether it changed the table; the tag is published once
    /// when it did and not at all otherwise, matching `remove` and `update`
    /// on a missing key.
    pub fn apply<F: FnOnce(&mut BTreeMap<u64, R>) -> bool>(&self, f: F) -> bool {
        let changed = f(&mut self.rows.write());
        if changed {
            self.publish();
        }
        changed
    }

    /// Insert every row; publishes once, or not at all for an empty batch
    pub fn extend<I: IntoIterator<Item = (u64, R)>>(&self, rows: I) {
        let mut rows = rows.into_iter().peekable();
        if rows.peek().is_none() {
            return;
        }
        self.apply(|table| {
            table.extend(rows);
            true
        });
    }

    pub fn get(&self, key: u64) -> Option<R> {
        self.rows.read().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Smallest and largest key, if any
    pub fn key_range(&self) -> Option<(u64, u64)> {
        let rows = self.rows.read();
        let first = *rows.keys().next()?;
        let last = *rows.keys().next_back()?;
        Some((first, last))
    }

    fn publish(&self) {
        if let Some(tracker) = &self.tracker {
            tracker.publish_tag(self.tag.clone());
        }
    }
}

impl<R: Clone> RowReader for MemoryStore<R> {
    type Predicate = MemoryQuery<R>;
    type Row = R;

    fn count(&self, predicate: &MemoryQuery<R>) -> Result<usize> {
        Ok(count_matching(&self.rows.read(), predicate))
    }

    fn fetch_window(&self, predicate: &MemoryQuery<R>, offset: usize, limit: usize) -> Result<Vec<R>> {
        Ok(window_matching(&self.rows.read(), predicate, offset, limit))
    }
}

impl<R: Clone + Send + Sync> QuerySource for MemoryStore<R> {
    type Snapshot<'a>
        = MemorySnapshot<'a, R>
    where
        Self: 'a;

    fn snapshot(&self) -> Result<MemorySnapshot<'_, R>> {
        Ok(MemorySnapshot {
            rows: self.rows.read(),
        })
    }
}

impl<R> fmt::Debug for MemoryStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("tag", &self.tag)
            .field("rows", &self.rows.read().len())
            .field("tracked", &self.tracker.is_some())
            .finish()
    }
}

/// Read view of a [`MemoryStore`]; writers block until it is dropped
pub struct MemorySnapshot<'a, R> {
    rows: RwLockReadGuard<'a, BTreeMap<u64, R>>,
}

impl<R: Clone> RowReader for MemorySnapshot<'_, R> {
    type Predicate = MemoryQuery<R>;
    type Row = R;

    fn count(&self, predicate: &MemoryQuery<R>) -> Result<usize> {
        Ok(count_matching(&self.rows, predicate))
    }

    fn fetch_window(&self, predicate: &MemoryQuery<R>, offset: usize, limit: usize) -> Result<Vec<R>> {
        Ok(window_matching(&self.rows, predicate, offset, limit))
    }
}

impl<R> fmt::Debug for MemorySnapshot<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySnapshot")
            .field("rows", &self.rows.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn numbers(n: u64) -> MemoryStore<u64> {
        let store = MemoryStore::new("numbers");
        store.extend((0..n).map(|i| (i, i)));
        store
    }

    #[test]
    fn test_count_and_window() {
        let store = numbers(10);
        let evens = MemoryQuery::new("evens", |n: &u64| n % 2 == 0);

        assert_eq!(store.count(&evens).unwrap(), 5);
        assert_eq!(store.fetch_window(&evens, 1, 2).unwrap(), vec![2, 4]);
        assert_eq!(store.fetch_window(&evens, 4, 10).unwrap(), vec![8]);
        assert!(store.fetch_window(&evens, 9, 3).unwrap().is_empty());
    }

    #[test]
    fn test_query_identity_is_by_name() {
        let a = MemoryQuery::<u64>::new("evens", |n| n % 2 == 0);
        let b = MemoryQuery::<u64>::new("evens", |_| false);
        let c = MemoryQuery::<u64>::all();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_writes_publish_tag() {
        let tracker = MutationTracker::new();
        let published = Arc::new(AtomicUsize::new(0));
        let published_clone = published.clone();
        let _handle = tracker.subscribe(["numbers"].into_iter().collect(), move |_| {
            published_clone.fetch_add(1, Ordering::SeqCst);
        });

        let store = MemoryStore::new("numbers").tracked_by(tracker);
        store.insert(1, 10u64);
        store.update(1, |row| *row += 1);
        store.extend([(2, 20), (3, 30)]);
        store.remove(2);

        // Misses do not count as writes
        store.remove(99);
        store.update(99, |row| *row += 1);

        assert_eq!(published.load(Ordering::SeqCst), 4);
        assert_eq!(store.get(1), Some(11));
    }

    #[test]
    fn test_no_op_batches_do_not_publish() {
        let tracker = MutationTracker::new();
        let published = Arc::new(AtomicUsize::new(0));
        let published_clone = published.clone();
        let _handle = tracker.subscribe(["numbers"].into_iter().collect(), move |_| {
            published_clone.fetch_add(1, Ordering::SeqCst);
        });

        let store = MemoryStore::<u64>::new("numbers").tracked_by(tracker);
        store.extend(std::iter::empty());
        assert!(!store.apply(|table| table.remove(&7).is_some()));
        assert_eq!(published.load(Ordering::SeqCst), 0);

        store.extend([(7, 70)]);
        assert!(store.apply(|table| table.remove(&7).is_some()));
        assert_eq!(published.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_publish_sees_committed_data() {
        let tracker = MutationTracker::new();
        let store = Arc::new(MemoryStore::<u64>::new("numbers").tracked_by(tracker.clone()));
        let observed = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&store);
        let observed_clone = observed.clone();
        let _handle = tracker.subscribe(["numbers"].into_iter().collect(), move |_| {
            if let Some(store) = weak.upgrade() {
                // Would deadlock if the write lock were still held
                observed_clone.store(store.len(), Ordering::SeqCst);
            }
        });

        store.insert(1, 1u64);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_blocks_writers_until_dropped() {
        let store = numbers(3);
        let all = MemoryQuery::all();

        let snapshot = store.snapshot().unwrap();
        assert!(store.rows.try_write().is_none());
        assert_eq!(snapshot.count(&all).unwrap(), 3);
        drop(snapshot);

        assert!(store.rows.try_write().is_some());
    }

    #[test]
    fn test_transaction_released_on_error() {
        let store = numbers(3);
        let all = MemoryQuery::all();

        let result: Result<usize> = store.with_transaction(|snapshot| {
            snapshot.count(&all)?;
            Err(StoreError::cancelled("reader cancelled"))
        });

        assert!(result.is_err());
        assert!(store.rows.try_write().is_some());
    }

    #[test]
    fn test_key_range() {
        assert_eq!(numbers(0).key_range(), None);
        assert_eq!(numbers(5).key_range(), Some((0, 4)));
    }
}
