//! Rowpager Paging Engine
//!
//! This crate serves positional windows ("pages") of an ordered,
//! query-backed dataset to a consumer such as an infinite-scroll list, while
//! other writers keep mutating the dataset underneath it.
//!
//! # Architecture
//!
//! ```text
//! writer ──commit──► MutationTracker ──publish(tags)──► PositionalPager (epoch N)
//!                                                             │ Invalid
//!                                                             ▼
//! consumer ◄── initial_load / range_load ◄── PagerFactory::create (epoch N+1)
//!                       │
//!                       ▼
//!                  QuerySource: count + fetch_window
//! ```
//!
//! ## Key Features
//!
//! - **Count/window reconciliation**: an initial load reads the total, clamps
//!   the requested window to it, and rejects a window whose length disagrees
//! - **One-way invalidation**: a pager that saw a watched mutation or a torn
//!   read never returns data again; consumers build the next epoch instead
//! - **Interchangeable read strategies**: optimistic (detect torn reads) or
//!   transactional (pin both reads to one snapshot), picked by configuration
//! - **Leak-free subscriptions**: the tracker only holds weak references to
//!   pager state and handles unsubscribe on drop
//!
//! # Example
//!
//! ```rust
//! use rowpager_core::prelude::*;
//! use std::sync::Arc;
//!
//! let tracker = MutationTracker::new();
//! let store = Arc::new(MemoryStore::new("messages").tracked_by(tracker.clone()));
//! store.extend((0..10u64).map(|i| (i, format!("message {}", i))));
//!
//! let factory = PagerFactory::new(
//!     store.clone(),
//!     MemoryQuery::all(),
//!     |row: String| row.to_uppercase(),
//!     ["messages"].into_iter().collect(),
//!     tracker,
//! );
//!
//! let pager = factory.create();
//! let page = pager.initial_load(4, 5)?.page().expect("no concurrent writers");
//! assert_eq!(page.start, 4);
//! assert_eq!(page.rows[0], "MESSAGE 4");
//!
//! store.remove(0);
//! assert!(pager.is_invalid());
//! assert!(pager.range_load(0, 5)?.is_empty());
//! # Ok::<(), rowpager_core::StoreError>(())
//! ```

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod factory;
pub mod memory;
pub mod metrics;
pub mod pager;
pub mod source;
pub mod tracker;
pub mod window;

// Re-export main types
pub use config::{PagerConfig, ReadStrategy};
pub use error::{ConfigError, ConsistencyViolation, Result, StoreError, StoreErrorKind};
pub use factory::PagerFactory;
pub use memory::{MemoryQuery, MemorySnapshot, MemoryStore};
pub use metrics::{InvalidationReason, MetricsSnapshot, PagerMetrics};
pub use pager::{InitialLoad, Page, PositionalPager};
pub use rowpager_types::{Epoch, MutationEvent, ResourceTag, SubscriptionId, TagSet};
pub use source::{QuerySource, RowMapper, RowReader};
pub use tracker::{MutationTracker, SubscriptionHandle, WriteScope};
pub use window::{resolve_initial, Window};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{PagerConfig, ReadStrategy};
    pub use crate::error::StoreError;
    pub use crate::factory::PagerFactory;
    pub use crate::memory::{MemoryQuery, MemoryStore};
    pub use crate::pager::{InitialLoad, Page, PositionalPager};
    pub use crate::source::{QuerySource, RowMapper, RowReader};
    pub use crate::tracker::MutationTracker;
    pub use rowpager_types::{Epoch, ResourceTag, TagSet};
}
