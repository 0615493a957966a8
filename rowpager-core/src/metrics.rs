//! Pager metrics
//!
//! Counters shared by every epoch created from one factory, so a consumer can
//! see how often its pagers were torn down and why.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a pager left the `Live` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    /// A watched resource tag was published
    Mutation,
    /// The initial window did not match the count read before it
    Mismatch,
    /// The owner called `invalidate` directly
    Explicit,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InvalidationReason::Mutation => "mutation",
            InvalidationReason::Mismatch => "mismatch",
            InvalidationReason::Explicit => "explicit",
        };
        f.write_str(name)
    }
}

/// Load and invalidation counters
#[derive(Debug, Default)]
pub struct PagerMetrics {
    pub initial_loads: AtomicU64,
    pub range_loads: AtomicU64,
    pub rows_served: AtomicU64,
    /// Loads answered with an empty result because the pager was invalid
    pub short_circuits: AtomicU64,
    pub mutation_invalidations: AtomicU64,
    pub mismatch_invalidations: AtomicU64,
    pub explicit_invalidations: AtomicU64,
    pub store_errors: AtomicU64,
    pub epochs_created: AtomicU64,
}

impl PagerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_initial_load(&self, rows: usize) {
        self.initial_loads.fetch_add(1, Ordering::Relaxed);
        self.rows_served.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_range_load(&self, rows: usize) {
        self.range_loads.fetch_add(1, Ordering::Relaxed);
        self.rows_served.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_short_circuit(&self) {
        self.short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self, reason: InvalidationReason) {
        let counter = match reason {
            InvalidationReason::Mutation => &self.mutation_invalidations,
            InvalidationReason::Mismatch => &self.mismatch_invalidations,
            InvalidationReason::Explicit => &self.explicit_invalidations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_epoch(&self) {
        self.epochs_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            initial_loads: self.initial_loads.load(Ordering::Relaxed),
            range_loads: self.range_loads.load(Ordering::Relaxed),
            rows_served: self.rows_served.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
            mutation_invalidations: self.mutation_invalidations.load(Ordering::Relaxed),
            mismatch_invalidations: self.mismatch_invalidations.load(Ordering::Relaxed),
            explicit_invalidations: self.explicit_invalidations.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            epochs_created: self.epochs_created.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`PagerMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub initial_loads: u64,
    pub range_loads: u64,
    pub rows_served: u64,
    pub short_circuits: u64,
    pub mutation_invalidations: u64,
    pub mismatch_invalidations: u64,
    pub explicit_invalidations: u64,
    pub store_errors: u64,
    pub epochs_created: u64,
}

impl MetricsSnapshot {
    pub fn invalidations(&self) -> u64 {
        self.mutation_invalidations + self.mismatch_invalidations + self.explicit_invalidations
    }

    /// Initial loads that reached the size check, loaded or not
    pub fn initial_load_attempts(&self) -> u64 {
        self.initial_loads + self.mismatch_invalidations
    }

    /// Fraction of initial load attempts thrown away by a count/window mismatch
    pub fn mismatch_rate(&self) -> f64 {
        let attempts = self.initial_load_attempts();
        if attempts == 0 {
            0.0
        } else {
            self.mismatch_invalidations as f64 / attempts as f64
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pager Statistics:")?;
        writeln!(
            f,
            "  Epochs: {} | Initial Loads: {} | Range Loads: {}",
            self.epochs_created, self.initial_loads, self.range_loads
        )?;
        writeln!(
            f,
            "  Rows Served: {} | Short Circuits: {} | Store Errors: {}",
            self.rows_served, self.short_circuits, self.store_errors
        )?;
        writeln!(
            f,
            "  Invalidations: {} (mutation {}, mismatch {}, explicit {}) | Mismatch Rate: {:.1}%",
            self.invalidations(),
            self.mutation_invalidations,
            self.mismatch_invalidations,
            self.explicit_invalidations,
            self.mismatch_rate() * 100.0
        )?;
        Ok(())
    }
}
