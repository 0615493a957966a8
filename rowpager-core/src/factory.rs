//! Pager factory
//!
//! Consumers never repair an invalid pager; they throw it away and ask the
//! factory for the next epoch, which re-derives count and window from the
//! store's current state.

use crate::config::PagerConfig;
use crate::metrics::{MetricsSnapshot, PagerMetrics};
use crate::pager::{Binding, PositionalPager};
use crate::source::{QuerySource, RowMapper};
use crate::tracker::MutationTracker;
use rowpager_types::{Epoch, TagSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Creates successive epochs of one query's pager
pub struct PagerFactory<S: QuerySource, M> {
    binding: Binding<S, M>,
    tracker: MutationTracker,
    last_epoch: AtomicU64,
}

impl<S, M> PagerFactory<S, M>
where
    S: QuerySource,
    M: RowMapper<S::Row>,
{
    pub fn new(
        source: Arc<S>,
        predicate: S::Predicate,
        mapper: M,
        tags: TagSet,
        tracker: MutationTracker,
    ) -> Self {
        PagerFactory {
            binding: Binding {
                source,
                predicate: Arc::new(predicate),
                mapper: Arc::new(mapper),
                tags,
                config: PagerConfig::default(),
                metrics: Arc::new(PagerMetrics::new()),
            },
            tracker,
            last_epoch: AtomicU64::new(0),
        }
    }

    pub fn with_config(mut self, config: PagerConfig) -> Self {
        self.binding.config = config;
        self
    }

    /// A fresh, live pager registered with the tracker
    pub fn create(&self) -> PositionalPager<S, M> {
        let epoch = Epoch(self.last_epoch.fetch_add(1, Ordering::SeqCst) + 1);
        PositionalPager::bind(self.binding.clone(), epoch, &self.tracker)
    }

    /// Epoch of the most recently created pager
    pub fn last_epoch(&self) -> Epoch {
        Epoch(self.last_epoch.load(Ordering::SeqCst))
    }

    pub fn config(&self) -> &PagerConfig {
        &self.binding.config
    }

    pub fn tags(&self) -> &TagSet {
        &self.binding.tags
    }

    pub fn tracker(&self) -> &MutationTracker {
        &self.tracker
    }

    /// Counters accumulated across every epoch
    pub fn metrics(&self) -> MetricsSnapshot {
        self.binding.metrics.snapshot()
    }
}

impl<S: QuerySource, M> fmt::Debug for PagerFactory<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagerFactory")
            .field("tags", &self.binding.tags)
            .field("config", &self.binding.config)
            .field("last_epoch", &self.last_epoch.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::source::RowReader;

    struct Fixed(Vec<&'static str>);

    impl RowReader for Fixed {
        type Predicate = ();
        type Row = &'static str;

        fn count(&self, _: &()) -> Result<usize> {
            Ok(self.0.len())
        }

        fn fetch_window(&self, _: &(), offset: usize, limit: usize) -> Result<Vec<&'static str>> {
            Ok(self.0.iter().skip(offset).take(limit).copied().collect())
        }
    }

    impl QuerySource for Fixed {
        type Snapshot<'a> = &'a Fixed;

        fn snapshot(&self) -> Result<&Fixed> {
            Ok(self)
        }
    }

    fn factory(tracker: MutationTracker) -> PagerFactory<Fixed, fn(&'static str) -> String> {
        PagerFactory::new(
            Arc::new(Fixed(vec!["a", "b", "c"])),
            (),
            str::to_uppercase as fn(&'static str) -> String,
            ["letters"].into_iter().collect(),
            tracker,
        )
    }

    #[test]
    fn test_epochs_increase() {
        let factory = factory(MutationTracker::new());

        assert_eq!(factory.last_epoch(), Epoch(0));
        let first = factory.create();
        let second = factory.create();

        assert_eq!(first.epoch(), Epoch(1));
        assert_eq!(second.epoch(), Epoch(2));
        assert_eq!(factory.last_epoch(), Epoch(2));
        assert_eq!(factory.metrics().epochs_created, 2);
    }

    #[test]
    fn test_new_epoch_after_invalidation() {
        let tracker = MutationTracker::new();
        let factory = factory(tracker.clone());

        let pager = factory.create();
        tracker.publish_tag("letters");
        assert!(pager.is_invalid());
        drop(pager);

        let pager = factory.create();
        assert!(!pager.is_invalid());
        let page = pager.initial_load(0, 2).unwrap().page().unwrap();
        assert_eq!(page.rows, vec!["A", "B"]);

        let metrics = factory.metrics();
        assert_eq!(metrics.mutation_invalidations, 1);
        assert_eq!(metrics.initial_loads, 1);
    }

    #[test]
    fn test_config_carried_to_pagers() {
        let factory = factory(MutationTracker::new())
            .with_config(PagerConfig::default().with_page_size(7));

        assert_eq!(factory.create().config().page_size, 7);
    }
}
