//! Query sources and row mapping
//!
//! A [`QuerySource`] executes the two paired reads the pager needs: a count
//! of the rows matching a predicate and an ordered window of those rows.
//! Sources that can pin both reads to one snapshot expose it through
//! [`QuerySource::snapshot`]; the snapshot value owns the underlying
//! transaction or cursor and releases it when dropped, so every exit path
//! (early return, `?`, panic, a cancelled caller dropping its future) gives
//! the resource back.

use crate::error::Result;

/// The paired reads over an ordered, predicate-defined dataset
pub trait RowReader {
    /// Filter and total order identifying the logical dataset
    type Predicate;

    /// Raw row as produced by the store
    type Row;

    /// Number of rows currently matching `predicate`
    fn count(&self, predicate: &Self::Predicate) -> Result<usize>;

    /// Up to `limit` rows starting at `offset` in the predicate's order.
    ///
    /// Returns fewer than `limit` rows only when fewer exist at or after
    /// `offset` in the snapshot being read.
    fn fetch_window(
        &self,
        predicate: &Self::Predicate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Self::Row>>;
}

impl<R: RowReader + ?Sized> RowReader for &R {
    type Predicate = R::Predicate;
    type Row = R::Row;

    fn count(&self, predicate: &Self::Predicate) -> Result<usize> {
        (**self).count(predicate)
    }

    fn fetch_window(
        &self,
        predicate: &Self::Predicate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Self::Row>> {
        (**self).fetch_window(predicate, offset, limit)
    }
}

/// A shared, mutable store the pager reads from
///
/// Sources without transactions can use `type Snapshot<'a> = &'a Self` and
/// return `Ok(self)`; the optimistic read strategy never calls `snapshot`.
pub trait QuerySource: RowReader + Send + Sync {
    /// A read view pinned to one point in time
    type Snapshot<'a>: RowReader<Predicate = Self::Predicate, Row = Self::Row>
    where
        Self: 'a;

    /// Acquire a read snapshot. Released on drop.
    fn snapshot(&self) -> Result<Self::Snapshot<'_>>;

    /// Run `read` inside a read snapshot, releasing it on every exit path
    fn with_transaction<'a, T, F>(&'a self, read: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&Self::Snapshot<'a>) -> Result<T>,
    {
        let snapshot = self.snapshot()?;
        read(&snapshot)
    }
}

/// Converts raw rows into caller-owned entities. Must be pure.
pub trait RowMapper<R>: Send + Sync {
    type Entity;

    fn map_row(&self, row: R) -> Self::Entity;

    fn map_rows(&self, rows: Vec<R>) -> Vec<Self::Entity> {
        rows.into_iter().map(|row| self.map_row(row)).collect()
    }
}

impl<R, E, F> RowMapper<R> for F
where
    F: Fn(R) -> E + Send + Sync,
{
    type Entity = E;

    fn map_row(&self, row: R) -> E {
        self(row)
    }
}
