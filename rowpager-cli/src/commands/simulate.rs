//! Scroll simulation.
//!
//! A writer thread appends to and trims an in-memory table while the main
//! thread scrolls it front to back, one page at a time. Every invalidation
//! sends the consumer back to the factory for a new epoch, exactly as a list
//! UI would.

use crate::scenario::SimulationConfig;
use anyhow::{anyhow, bail, Result};
use rowpager_core::{
    InitialLoad, MemoryQuery, MemoryStore, MetricsSnapshot, MutationTracker, PagerFactory,
    QuerySource, ReadStrategy, RowMapper,
};
use rowpager_types::{Epoch, TagSet};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub struct SimulateOptions {
    pub rows: Option<u64>,
    pub writes: Option<usize>,
    pub strategy: Option<ReadStrategy>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub read_strategy: ReadStrategy,
    pub initial_rows: u64,
    pub final_rows: usize,
    pub writes: usize,
    /// Scroll passes that reached the end without being invalidated
    pub passes: u64,
    /// Passes abandoned because their pager was invalidated
    pub restarts: u64,
    pub rows_scrolled: usize,
    pub last_epoch: Epoch,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Default)]
struct ScrollOutcome {
    passes: u64,
    restarts: u64,
    rows_scrolled: usize,
}

pub fn simulate(config_path: Option<&Path>, opts: SimulateOptions) -> Result<()> {
    let mut config = SimulationConfig::load(config_path)?;
    if let Some(rows) = opts.rows {
        config.rows = rows;
    }
    if let Some(writes) = opts.writes {
        config.writes = writes;
    }
    if let Some(strategy) = opts.strategy {
        config.pager.read_strategy = strategy;
    }
    config.validate()?;

    let report = run(&config)?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Simulation complete: {} passes, {} restarts, {} rows scrolled, last epoch {}",
            report.passes, report.restarts, report.rows_scrolled, report.last_epoch
        );
        println!(
            "Table: {} rows -> {} rows after {} writes ({:?} reads)",
            report.initial_rows, report.final_rows, report.writes, report.read_strategy
        );
        print!("{}", report.metrics);
    }
    Ok(())
}

fn run(config: &SimulationConfig) -> Result<SimulationReport> {
    let tracker = MutationTracker::new();
    let store = Arc::new(MemoryStore::new(config.table.clone()).tracked_by(tracker.clone()));
    store.extend((0..config.rows).map(|key| (key, key)));

    let mut tags = TagSet::new();
    tags.insert(config.table.clone());
    let factory = PagerFactory::new(
        store.clone(),
        MemoryQuery::all(),
        |key: u64| format!("row-{}", key),
        tags,
        tracker,
    )
    .with_config(config.pager.clone());

    tracing::info!(
        rows = config.rows,
        writes = config.writes,
        strategy = ?config.pager.read_strategy,
        "starting simulation"
    );

    let outcome = thread::scope(|scope| -> Result<ScrollOutcome> {
        let writer = scope.spawn(|| write_load(&store, config));
        let outcome = scroll(&factory, config, || writer.is_finished());
        writer
            .join()
            .map_err(|_| anyhow!("writer thread panicked"))?;
        outcome
    })?;

    let report = SimulationReport {
        read_strategy: config.pager.read_strategy,
        initial_rows: config.rows,
        final_rows: store.len(),
        writes: config.writes,
        passes: outcome.passes,
        restarts: outcome.restarts,
        rows_scrolled: outcome.rows_scrolled,
        last_epoch: factory.last_epoch(),
        metrics: factory.metrics(),
    };
    tracing::info!(
        passes = report.passes,
        restarts = report.restarts,
        epoch = %report.last_epoch,
        "simulation finished"
    );
    Ok(report)
}

fn write_load(store: &MemoryStore<u64>, config: &SimulationConfig) {
    let mut next_key = config.rows;
    let interval = Duration::from_micros(config.write_interval_us);

    for write in 1..=config.writes {
        if config.delete_every > 0 && write % config.delete_every == 0 {
            if let Some((oldest, _)) = store.key_range() {
                store.remove(oldest);
                tracing::trace!(key = oldest, "writer deleted row");
            }
        } else {
            store.insert(next_key, next_key);
            tracing::trace!(key = next_key, "writer appended row");
            next_key += 1;
        }

        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
}

/// Scroll until a full pass completes after the writer has stopped
fn scroll<S, M, F>(
    factory: &PagerFactory<S, M>,
    config: &SimulationConfig,
    writer_done: F,
) -> Result<ScrollOutcome>
where
    S: QuerySource,
    M: RowMapper<S::Row>,
    F: Fn() -> bool,
{
    let mut outcome = ScrollOutcome::default();
    loop {
        let settled = writer_done();
        if scroll_pass(factory, config, &mut outcome)? && settled {
            return Ok(outcome);
        }
        if factory.last_epoch().0 >= config.max_epochs {
            bail!("gave up after {} epochs", config.max_epochs);
        }
    }
}

/// One front-to-back pass over a single epoch; false if it was invalidated
fn scroll_pass<S, M>(
    factory: &PagerFactory<S, M>,
    config: &SimulationConfig,
    outcome: &mut ScrollOutcome,
) -> Result<bool>
where
    S: QuerySource,
    M: RowMapper<S::Row>,
{
    let pager = factory.create();
    let page = match pager.initial_load(config.start, config.pager.initial_load_size())? {
        InitialLoad::Loaded(page) => page,
        InitialLoad::Invalidated => {
            outcome.restarts += 1;
            return Ok(false);
        }
    };

    let mut position = page.start + page.rows.len();
    outcome.rows_scrolled += page.rows.len();

    while position < page.total_count {
        let rows = pager.range_load(position, config.pager.page_size)?;
        if pager.is_invalid() {
            outcome.restarts += 1;
            return Ok(false);
        }
        if rows.is_empty() {
            break;
        }
        position += rows.len();
        outcome.rows_scrolled += rows.len();
    }

    outcome.passes += 1;
    tracing::debug!(epoch = %pager.epoch(), rows = position, "scroll pass complete");
    Ok(true)
}
