//! Positional pager
//!
//! A [`PositionalPager`] serves windows of one predicate's rows for the
//! lifetime of one epoch. It is `Live` until a watched resource tag is
//! published or until it catches its own count and window disagreeing;
//! after that it is `Invalid` forever and every load returns an empty
//! result without touching the store. Consumers react by discarding it and
//! asking their [`PagerFactory`](crate::factory::PagerFactory) for the next
//! epoch.
//!
//! # Initial loads
//!
//! ```text
//! count ──► resolve window ──► fetch window ──► len == resolved? ──► Loaded
//!                                                     │ no
//!                                                     └──► invalidate ──► Invalidated
//! ```
//!
//! Under [`ReadStrategy::Optimistic`] the count and the fetch are separate
//! reads and the length check catches writes that landed in between. Under
//! [`ReadStrategy::Transactional`] both run inside one store snapshot.

use crate::config::{PagerConfig, ReadStrategy};
use crate::error::{ConsistencyViolation, Result, StoreError};
use crate::metrics::{InvalidationReason, PagerMetrics};
use crate::source::{QuerySource, RowMapper, RowReader};
use crate::tracker::{MutationTracker, SubscriptionHandle};
use crate::window::{resolve_initial, Window};
use parking_lot::Mutex;
use rowpager_types::{Epoch, TagSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A successfully loaded initial window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub rows: Vec<T>,

    /// Position of `rows[0]` in the predicate's order
    pub start: usize,

    /// Rows matching the predicate when the window was read
    pub total_count: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Page {
            rows: Vec::new(),
            start: 0,
            total_count: 0,
        }
    }

    pub fn window(&self) -> Window {
        Window::new(self.start, self.rows.len())
    }
}

/// Outcome of [`PositionalPager::initial_load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialLoad<T> {
    Loaded(Page<T>),

    /// The pager is invalid; build a new epoch and load again
    Invalidated,
}

impl<T> InitialLoad<T> {
    pub fn is_invalidated(&self) -> bool {
        matches!(self, InitialLoad::Invalidated)
    }

    pub fn page(self) -> Option<Page<T>> {
        match self {
            InitialLoad::Loaded(page) => Some(page),
            InitialLoad::Invalidated => None,
        }
    }
}

type InvalidatedCallback = Box<dyn FnOnce() + Send>;

/// State shared between a pager and its tracker subscription.
///
/// The tracker only ever sees a `Weak` to this, so a pager dropped without
/// cleanup is freed immediately and its late notifications are no-ops.
struct PagerState {
    epoch: Epoch,
    invalid: AtomicBool,
    callbacks: Mutex<Vec<InvalidatedCallback>>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    metrics: Arc<PagerMetrics>,
}

impl PagerState {
    fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::SeqCst)
    }

    /// Returns true for the call that performed the transition
    fn invalidate(&self, reason: InvalidationReason) -> bool {
        if self.invalid.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.metrics.record_invalidation(reason);
        tracing::info!(epoch = %self.epoch, %reason, "pager invalidated");

        // Nothing left to watch for
        let subscription = self.subscription.lock().take();
        drop(subscription);

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            callback();
        }
        true
    }

    fn add_callback(&self, callback: InvalidatedCallback) {
        let mut callbacks = self.callbacks.lock();
        if self.is_invalid() {
            drop(callbacks);
            callback();
        } else {
            callbacks.push(callback);
        }
    }
}

/// Everything a pager needs besides its per-epoch state.
///
/// Shared by a factory and all pagers it creates.
pub(crate) struct Binding<S: QuerySource, M> {
    pub(crate) source: Arc<S>,
    pub(crate) predicate: Arc<S::Predicate>,
    pub(crate) mapper: Arc<M>,
    pub(crate) tags: TagSet,
    pub(crate) config: PagerConfig,
    pub(crate) metrics: Arc<PagerMetrics>,
}

impl<S: QuerySource, M> Clone for Binding<S, M> {
    fn clone(&self) -> Self {
        Binding {
            source: self.source.clone(),
            predicate: self.predicate.clone(),
            mapper: self.mapper.clone(),
            tags: self.tags.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// One epoch of paged reads over a predicate
pub struct PositionalPager<S: QuerySource, M> {
    binding: Binding<S, M>,
    state: Arc<PagerState>,
}

impl<S, M> PositionalPager<S, M>
where
    S: QuerySource,
    M: RowMapper<S::Row>,
{
    /// Create a standalone pager and register it with `tracker`.
    ///
    /// Use a [`PagerFactory`](crate::factory::PagerFactory) when the consumer
    /// needs to rebuild pagers after invalidation.
    pub fn new(
        source: Arc<S>,
        predicate: S::Predicate,
        mapper: M,
        tags: TagSet,
        tracker: &MutationTracker,
        config: PagerConfig,
    ) -> Self {
        let binding = Binding {
            source,
            predicate: Arc::new(predicate),
            mapper: Arc::new(mapper),
            tags,
            config,
            metrics: Arc::new(PagerMetrics::new()),
        };
        Self::bind(binding, Epoch(1), tracker)
    }

    pub(crate) fn bind(binding: Binding<S, M>, epoch: Epoch, tracker: &MutationTracker) -> Self {
        binding.metrics.record_epoch();
        let state = Arc::new(PagerState {
            epoch,
            invalid: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            metrics: binding.metrics.clone(),
        });

        let weak = Arc::downgrade(&state);
        let handle = tracker.subscribe(binding.tags.clone(), move |event| {
            if let Some(state) = weak.upgrade() {
                tracing::debug!(
                    epoch = %state.epoch,
                    tags = %event.tags,
                    sequence = event.sequence,
                    "watched resource mutated"
                );
                state.invalidate(InvalidationReason::Mutation);
            }
        });
        *state.subscription.lock() = Some(handle);
        // A publish may have landed before the handle was stored
        if state.is_invalid() {
            state.subscription.lock().take();
        }

        tracing::debug!(%epoch, tags = %binding.tags, "pager created");
        PositionalPager { binding, state }
    }

    /// Load the first window around `requested_start`.
    ///
    /// Returns an empty page when no rows match, and
    /// [`InitialLoad::Invalidated`] when the pager is (or becomes) invalid.
    /// Store errors propagate and leave the pager live.
    pub fn initial_load(
        &self,
        requested_start: usize,
        requested_size: usize,
    ) -> Result<InitialLoad<M::Entity>> {
        if self.short_circuit() {
            return Ok(InitialLoad::Invalidated);
        }

        match self.binding.config.read_strategy {
            ReadStrategy::Optimistic => {
                self.load_initial_from(&*self.binding.source, requested_start, requested_size)
            }
            ReadStrategy::Transactional => {
                let snapshot = self
                    .binding
                    .source
                    .snapshot()
                    .map_err(|err| self.observe_error(err))?;
                self.load_initial_from(&snapshot, requested_start, requested_size)
            }
        }
    }

    fn load_initial_from<R>(
        &self,
        reader: &R,
        requested_start: usize,
        requested_size: usize,
    ) -> Result<InitialLoad<M::Entity>>
    where
        R: RowReader<Predicate = S::Predicate, Row = S::Row>,
    {
        let predicate = &*self.binding.predicate;
        let total_count = reader
            .count(predicate)
            .map_err(|err| self.observe_error(err))?;

        if total_count == 0 {
            self.binding.metrics.record_initial_load(0);
            tracing::debug!(epoch = %self.state.epoch, "initial load found no rows");
            return Ok(InitialLoad::Loaded(Page::empty()));
        }

        let window = resolve_initial(
            requested_start,
            requested_size,
            total_count,
            self.binding.config.alignment(),
        );
        let rows = if window.is_empty() {
            Vec::new()
        } else {
            reader
                .fetch_window(predicate, window.start, window.len)
                .map_err(|err| self.observe_error(err))?
        };

        if rows.len() != window.len {
            let violation = ConsistencyViolation {
                offset: window.start,
                expected: window.len,
                actual: rows.len(),
            };
            tracing::warn!(
                epoch = %self.state.epoch,
                total_count,
                %violation,
                "dataset changed between count and fetch"
            );
            self.state.invalidate(InvalidationReason::Mismatch);
            return Ok(InitialLoad::Invalidated);
        }

        let rows = self.binding.mapper.map_rows(rows);
        if self.short_circuit() {
            return Ok(InitialLoad::Invalidated);
        }

        self.binding.metrics.record_initial_load(rows.len());
        tracing::debug!(
            epoch = %self.state.epoch,
            requested_start,
            requested_size,
            %window,
            total_count,
            "initial load"
        );
        Ok(InitialLoad::Loaded(Page {
            rows,
            start: window.start,
            total_count,
        }))
    }

    /// Load `length` rows starting at `start`, without re-counting.
    ///
    /// Callers should stay within the total of this epoch's initial load.
    /// Returns an empty vector when the pager is invalid.
    pub fn range_load(&self, start: usize, length: usize) -> Result<Vec<M::Entity>> {
        if self.short_circuit() {
            return Ok(Vec::new());
        }
        if length == 0 {
            return Ok(Vec::new());
        }

        let predicate = &*self.binding.predicate;
        let source = &*self.binding.source;
        let rows = match self.binding.config.read_strategy {
            ReadStrategy::Optimistic => source.fetch_window(predicate, start, length),
            ReadStrategy::Transactional => {
                source.with_transaction(|snapshot| snapshot.fetch_window(predicate, start, length))
            }
        }
        .map_err(|err| self.observe_error(err))?;

        let rows = self.binding.mapper.map_rows(rows);
        if self.short_circuit() {
            return Ok(Vec::new());
        }

        self.binding.metrics.record_range_load(rows.len());
        tracing::trace!(epoch = %self.state.epoch, start, length, returned = rows.len(), "range load");
        Ok(rows)
    }

    /// Mark the pager invalid. Idempotent; returns true for the call that
    /// performed the transition.
    pub fn invalidate(&self) -> bool {
        self.state.invalidate(InvalidationReason::Explicit)
    }

    pub fn is_invalid(&self) -> bool {
        self.state.is_invalid()
    }

    /// Run `callback` once when this pager becomes invalid, or immediately
    /// if it already is.
    pub fn add_invalidated_callback<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.add_callback(Box::new(callback));
    }

    pub fn epoch(&self) -> Epoch {
        self.state.epoch
    }

    pub fn tags(&self) -> &TagSet {
        &self.binding.tags
    }

    pub fn predicate(&self) -> &S::Predicate {
        &self.binding.predicate
    }

    pub fn config(&self) -> &PagerConfig {
        &self.binding.config
    }

    pub fn metrics(&self) -> &PagerMetrics {
        &self.binding.metrics
    }

    fn short_circuit(&self) -> bool {
        if self.state.is_invalid() {
            self.binding.metrics.record_short_circuit();
            true
        } else {
            false
        }
    }

    fn observe_error(&self, err: StoreError) -> StoreError {
        self.binding.metrics.record_store_error();
        tracing::debug!(epoch = %self.state.epoch, error = %err, "store read failed");
        err
    }
}

impl<S: QuerySource, M> fmt::Debug for PositionalPager<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionalPager")
            .field("epoch", &self.state.epoch)
            .field("invalid", &self.state.is_invalid())
            .field("tags", &self.binding.tags)
            .field("read_strategy", &self.binding.config.read_strategy)
            .finish()
    }
}
