//! Mutation tracking
//!
//! The [`MutationTracker`] routes committed writes to the subscribers that
//! watch the touched resource tags. Writers call [`MutationTracker::publish`]
//! after their mutation is visible to readers; every subscription whose tag
//! set intersects the published tags is called exactly once for that publish.
//!
//! Subscriptions are owned by their [`SubscriptionHandle`]. Dropping the
//! handle unsubscribes, so a consumer that forgets to clean up never leaves
//! a dangling registration behind.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use rowpager_types::{MutationEvent, ResourceTag, SubscriptionId, TagSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Callback = Box<dyn Fn(&MutationEvent) + Send + Sync>;

struct Subscriber {
    tags: TagSet,
    callback: Callback,
    active: AtomicBool,
}

struct TrackerInner {
    subscribers: DashMap<SubscriptionId, Arc<Subscriber>>,
    next_id: AtomicU64,
    sequence: AtomicU64,
}

impl TrackerInner {
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.subscribers.remove(&id) {
            Some((_, subscriber)) => {
                subscriber.active.store(false, Ordering::SeqCst);
                tracing::trace!(subscription = %id, "unsubscribed");
                true
            }
            None => false,
        }
    }
}

/// Registry of resource-tag subscriptions
///
/// Cloning the tracker is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct MutationTracker {
    inner: Arc<TrackerInner>,
}

static GLOBAL: Lazy<MutationTracker> = Lazy::new(MutationTracker::new);

impl MutationTracker {
    pub fn new() -> Self {
        MutationTracker {
            inner: Arc::new(TrackerInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    /// The process-wide tracker
    pub fn global() -> &'static MutationTracker {
        &GLOBAL
    }

    /// Watch `tags`; `on_invalidated` runs once per matching publish.
    pub fn subscribe<F>(&self, tags: TagSet, on_invalidated: F) -> SubscriptionHandle
    where
        F: Fn(&MutationEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        if tags.is_empty() {
            tracing::debug!(subscription = %id, "subscription watches no tags");
        }

        let subscriber = Arc::new(Subscriber {
            tags,
            callback: Box::new(on_invalidated),
            active: AtomicBool::new(true),
        });
        self.inner.subscribers.insert(id, subscriber);

        SubscriptionHandle {
            id,
            tracker: Arc::downgrade(&self.inner),
        }
    }

    /// Notify every subscription watching any of `tags`.
    ///
    /// Callbacks run synchronously on the caller's thread, after the registry
    /// locks are released, so a callback may itself subscribe or unsubscribe.
    /// Returns the number of subscriptions notified.
    pub fn publish(&self, tags: &TagSet) -> usize {
        if tags.is_empty() {
            return 0;
        }

        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = MutationEvent {
            tags: tags.clone(),
            sequence,
        };

        let targets: Vec<Arc<Subscriber>> = self
            .inner
            .subscribers
            .iter()
            .filter(|entry| entry.value().tags.intersects(tags))
            .map(|entry| entry.value().clone())
            .collect();

        let mut notified = 0;
        for subscriber in targets {
            // Skip subscriptions removed after the snapshot above
            if subscriber.active.load(Ordering::SeqCst) {
                (subscriber.callback)(&event);
                notified += 1;
            }
        }

        tracing::trace!(tags = %tags, sequence, notified, "published mutation");
        notified
    }

    /// Convenience for a write touching a single tag
    pub fn publish_tag(&self, tag: impl Into<ResourceTag>) -> usize {
        let mut tags = TagSet::new();
        tags.insert(tag);
        self.publish(&tags)
    }

    /// Remove a subscription. Safe to call repeatedly and concurrently with
    /// `publish`; returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Start a write that may touch several tags and should publish once
    pub fn write_scope(&self) -> WriteScope<'_> {
        WriteScope {
            tracker: self,
            tags: TagSet::new(),
            committed: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Number of subscriptions currently watching `tag`
    pub fn subscribers_for(&self, tag: &ResourceTag) -> usize {
        self.inner
            .subscribers
            .iter()
            .filter(|entry| entry.value().tags.contains(tag))
            .count()
    }

    /// Sequence number of the most recent publish
    pub fn last_sequence(&self) -> u64 {
        self.inner.sequence.load(Ordering::SeqCst)
    }
}

impl Default for MutationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MutationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationTracker")
            .field("subscribers", &self.subscriber_count())
            .field("last_sequence", &self.last_sequence())
            .finish()
    }
}

/// Owner of one tracker subscription; unsubscribes on drop
pub struct SubscriptionHandle {
    id: SubscriptionId,
    tracker: Weak<TrackerInner>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Idempotent explicit unsubscribe
    pub fn unsubscribe(&self) -> bool {
        match self.tracker.upgrade() {
            Some(inner) => inner.unsubscribe(self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.tracker
            .upgrade()
            .map(|inner| inner.subscribers.contains_key(&self.id))
            .unwrap_or(false)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .finish()
    }
}

/// Accumulates the tags touched by one logical write
///
/// `commit` publishes the accumulated tags once. Dropping the scope without
/// committing (a rolled back write) publishes nothing.
pub struct WriteScope<'a> {
    tracker: &'a MutationTracker,
    tags: TagSet,
    committed: bool,
}

impl WriteScope<'_> {
    pub fn touch(&mut self, tag: impl Into<ResourceTag>) -> &mut Self {
        self.tags.insert(tag);
        self
    }

    pub fn touched(&self) -> &TagSet {
        &self.tags
    }

    /// Publish the touched tags; call after the write is visible
    pub fn commit(mut self) -> usize {
        self.committed = true;
        self.tracker.publish(&self.tags)
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.tags.is_empty() {
            tracing::debug!(tags = %self.tags, "write scope dropped without commit");
        }
    }
}

impl fmt::Debug for WriteScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteScope")
            .field("tags", &self.tags)
            .field("committed", &self.committed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn tags(names: &[&str]) -> TagSet {
        names.iter().copied().collect()
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&MutationEvent) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        (count, move |_: &MutationEvent| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_publish_reaches_matching_subscribers() {
        let tracker = MutationTracker::new();
        let (messages, on_messages) = counter();
        let (stickers, on_stickers) = counter();

        let _a = tracker.subscribe(tags(&["messages"]), on_messages);
        let _b = tracker.subscribe(tags(&["stickers"]), on_stickers);

        assert_eq!(tracker.publish(&tags(&["messages"])), 1);
        assert_eq!(messages.load(Ordering::SeqCst), 1);
        assert_eq!(stickers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_one_notification_per_publish() {
        let tracker = MutationTracker::new();
        let (count, on_change) = counter();

        let _handle = tracker.subscribe(tags(&["messages", "users"]), on_change);

        // Both watched tags in one publish still means one call
        tracker.publish(&tags(&["messages", "users", "stickers"]));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tracker.publish(&tags(&["users"]));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_retroactive_delivery() {
        let tracker = MutationTracker::new();
        tracker.publish_tag("messages");

        let (count, on_change) = counter();
        let _handle = tracker.subscribe(tags(&["messages"]), on_change);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let tracker = MutationTracker::new();
        let (count, on_change) = counter();

        let handle = tracker.subscribe(tags(&["messages"]), on_change);
        assert!(handle.is_active());

        assert!(handle.unsubscribe());
        assert!(!handle.unsubscribe());
        assert!(!tracker.unsubscribe(handle.id()));
        assert!(!handle.is_active());

        tracker.publish_tag("messages");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let tracker = MutationTracker::new();
        let (_count, on_change) = counter();

        let handle = tracker.subscribe(tags(&["messages"]), on_change);
        assert_eq!(tracker.subscribers_for(&"messages".into()), 1);

        drop(handle);
        assert_eq!(tracker.subscriber_count(), 0);
    }

    #[test]
    fn test_handle_outlives_tracker() {
        let tracker = MutationTracker::new();
        let (_count, on_change) = counter();

        let handle = tracker.subscribe(tags(&["messages"]), on_change);
        drop(tracker);

        assert!(!handle.is_active());
        assert!(!handle.unsubscribe());
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let tracker = MutationTracker::new();
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();

        let handle = tracker.subscribe(tags(&["messages"]), move |_| {
            if let Some(handle) = slot_clone.lock().take() {
                handle.unsubscribe();
            }
        });
        *slot.lock() = Some(handle);

        assert_eq!(tracker.publish_tag("messages"), 1);
        assert_eq!(tracker.publish_tag("messages"), 0);
    }

    #[test]
    fn test_event_sequence_increases() {
        let tracker = MutationTracker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _handle = tracker.subscribe(tags(&["messages"]), move |event| {
            seen_clone.lock().push(event.sequence);
        });

        tracker.publish_tag("messages");
        tracker.publish_tag("users");
        tracker.publish_tag("messages");

        assert_eq!(*seen.lock(), vec![1, 3]);
        assert_eq!(tracker.last_sequence(), 3);
    }

    #[test]
    fn test_write_scope_publishes_once_on_commit() {
        let tracker = MutationTracker::new();
        let (count, on_change) = counter();
        let _handle = tracker.subscribe(tags(&["messages", "users"]), on_change);

        let mut scope = tracker.write_scope();
        scope.touch("messages").touch("users");
        assert_eq!(scope.touched().len(), 2);
        assert_eq!(scope.commit(), 1);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_scope_rollback_publishes_nothing() {
        let tracker = MutationTracker::new();
        let (count, on_change) = counter();
        let _handle = tracker.subscribe(tags(&["messages"]), on_change);

        {
            let mut scope = tracker.write_scope();
            scope.touch("messages");
        }

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.last_sequence(), 0);
    }

    #[test]
    fn test_concurrent_publish_and_unsubscribe() {
        use std::thread;

        let tracker = MutationTracker::new();
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let (_count, on_change) = counter();
                tracker.subscribe(tags(&["messages"]), on_change)
            })
            .collect();

        let publisher = {
            let tracker = tracker.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    tracker.publish_tag("messages");
                }
            })
        };

        for handle in handles {
            handle.unsubscribe();
        }
        publisher.join().unwrap();

        assert_eq!(tracker.subscriber_count(), 0);
    }
}
