//! Stress run orchestration.

use std::collections::BTreeMap;
use std::ptr::NonNull;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, ensure, Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use pagepool::{Pool, PoolSnapshot};

use crate::config::StressConfig;

/// Bytes per page used by the stress pool.
pub const PAGE_SIZE: usize = 64 * 1024;

/// Slot alignment used by the stress pool.
pub const PAGE_ALIGN: usize = 16;

type StressPool = Pool<PAGE_SIZE, PAGE_ALIGN>;

/// Live `[start, end)` address ranges shared by all workers.
#[derive(Default)]
struct Ledger {
    live: Mutex<BTreeMap<usize, usize>>,
}

impl Ledger {
    /// Record a new range. Returns `false`, recording nothing, if it
    /// overlaps a live one.
    fn claim(&self, start: usize, end: usize) -> bool {
        let mut live = self.live.lock();
        let clear = live
            .range(..end)
            .next_back()
            .map_or(true, |(_, &prev_end)| prev_end <= start);
        if clear {
            live.insert(start, end);
        }
        clear
    }

    fn forget(&self, start: usize) {
        self.live.lock().remove(&start);
    }
}

#[derive(Debug, Default)]
struct WorkerOutcome {
    occupied: u64,
    missed: u64,
    aliased: u64,
    rejected: u64,
}

/// Result of a stress run.
#[derive(Debug, Serialize)]
pub struct StressReport {
    /// Worker threads.
    pub threads: usize,
    /// Occupy attempts per thread.
    pub iterations: usize,
    /// Bytes per block.
    pub block_bytes: usize,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u128,
    /// Successful occupies.
    pub occupied: u64,
    /// Occupies that returned no memory.
    pub missed: u64,
    /// Allocations that overlapped a live range.
    pub aliased: u64,
    /// Releases the pool refused.
    pub rejected_releases: u64,
    /// Pool state after all workers finished.
    pub pool: PoolSnapshot,
}

impl StressReport {
    /// Human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} threads x {} iterations of {} bytes in {} ms\n\
             occupied: {}  missed: {}  aliased: {}  rejected releases: {}\n\
             pages: {}  provisioned: {}  average demand: {:.4}",
            self.threads,
            self.iterations,
            self.block_bytes,
            self.elapsed_ms,
            self.occupied,
            self.missed,
            self.aliased,
            self.rejected_releases,
            self.pool.pages,
            self.pool.stats.provisioned_pages,
            self.pool.demand.average,
        )
    }
}

fn worker(pool: &StressPool, ledger: &Ledger, config: &StressConfig) -> WorkerOutcome {
    let bytes = config.block_bytes;
    let mut outcome = WorkerOutcome::default();
    let mut held = Vec::with_capacity(config.hold);

    // Each held block remembers whether its range made it into the ledger.
    let release_all = |held: &mut Vec<(NonNull<u8>, bool)>, outcome: &mut WorkerOutcome| {
        for (ptr, claimed) in held.drain(..) {
            if claimed {
                ledger.forget(ptr.as_ptr() as usize);
            }
            if !pool.release(ptr, bytes) {
                outcome.rejected += 1;
            }
        }
    };

    for _ in 0..config.iterations {
        match pool.occupy::<u8>(bytes) {
            Some(ptr) => {
                outcome.occupied += 1;
                let start = ptr.as_ptr() as usize;
                let claimed = ledger.claim(start, start + bytes.max(1));
                if !claimed {
                    outcome.aliased += 1;
                }
                held.push((ptr, claimed));
            }
            None => {
                outcome.missed += 1;
                thread::yield_now();
            }
        }
        if held.len() >= config.hold.max(1) {
            release_all(&mut held, &mut outcome);
        }
    }
    release_all(&mut held, &mut outcome);
    outcome
}

/// Run the stress workload and verify the pool stayed consistent.
pub fn run(config: &StressConfig) -> Result<StressReport> {
    let pool = StressPool::with_config(config.pool_config()).context("building pool")?;
    let ledger = Ledger::default();
    info!(
        threads = config.threads,
        iterations = config.iterations,
        block_bytes = config.block_bytes,
        "starting stress run"
    );

    let started = Instant::now();
    let outcomes: Vec<WorkerOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|_| scope.spawn(|| worker(&pool, &ledger, config)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().map_err(|_| anyhow!("stress worker panicked")))
            .collect::<Result<_>>()
    })?;
    let elapsed_ms = started.elapsed().as_millis();

    let mut report = StressReport {
        threads: config.threads,
        iterations: config.iterations,
        block_bytes: config.block_bytes,
        elapsed_ms,
        occupied: 0,
        missed: 0,
        aliased: 0,
        rejected_releases: 0,
        pool: pool.snapshot(),
    };
    for outcome in &outcomes {
        report.occupied += outcome.occupied;
        report.missed += outcome.missed;
        report.aliased += outcome.aliased;
        report.rejected_releases += outcome.rejected;
    }
    debug!(loads = ?report.pool.loads, "final page loads");

    ensure!(report.aliased == 0, "{} allocations aliased live memory", report.aliased);
    ensure!(
        report.rejected_releases == 0,
        "{} releases were rejected",
        report.rejected_releases
    );
    ensure!(
        report.pool.occupied_bytes == 0,
        "{} bytes still occupied after all releases",
        report.pool.occupied_bytes
    );
    Ok(report)
}
