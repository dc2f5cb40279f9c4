//! Thread-safe pool of pages with load-based selection.
//!
//! The page index and the demand statistics sit behind two independent
//! `RwLock`s. No thread ever holds both: `occupy` finishes with the index
//! before touching the statistics, and the provisioner reads them one after
//! the other.

use std::ptr::NonNull;
use std::sync::Arc;

use allocator_api2::alloc::{Allocator, Global};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, trace};

use pagepool_core::Page;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::index::PageIndex;
use crate::provision::{needs_growth, Provisioner};
use crate::stats::{AtomicPoolStats, Demand, PoolStats};

/// State shared between caller threads and the provisioner.
pub(crate) struct Shared<const SIZE: usize, const ALIGN: usize, A: Allocator = Global> {
    index: RwLock<PageIndex<SIZE, ALIGN, A>>,
    demand: RwLock<Demand>,
    stats: AtomicPoolStats,
    config: PoolConfig,
    wake: Sender<()>,
}

impl<const SIZE: usize, const ALIGN: usize, A: Allocator> Shared<SIZE, ALIGN, A> {
    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Build up to `count` pages, stopping at `max_pages`.
    fn make_pages(&self, count: usize) -> usize {
        let mut made = 0;
        for _ in 0..count {
            let page = Page::<SIZE, ALIGN>::new();
            let id = page.id();

            let mut index = self.index.write();
            if self.config.max_pages.is_some_and(|max| index.len() >= max) {
                break;
            }
            index.insert(page);
            made += 1;
            debug!(%id, pages = index.len(), "page added");
        }
        made
    }

    fn occupy<T>(&self, count: usize) -> Option<NonNull<T>> {
        let requested = Page::<SIZE, ALIGN>::load_of::<T>(count);

        let (ptr, least_load) = {
            let mut index = self.index.write();
            let ptr = index.occupy::<T>(count, self.config.occupy_probe_limit);
            (ptr, index.least_load())
        };

        let average = {
            let mut demand = self.demand.write();
            demand.record(requested);
            demand.average
        };

        self.stats.record_occupy(ptr.is_some());
        if ptr.is_none() {
            trace!(count, requested, "occupy found no page with room");
        }
        if needs_growth(least_load, average, self.config.grow_watermark) {
            let _ = self.wake.try_send(());
        }
        ptr
    }

    fn release<T>(&self, ptr: NonNull<T>, count: usize) -> bool {
        let released = self.index.write().release(ptr, count);
        self.stats.record_release(released);
        if !released {
            debug!(addr = ptr.as_ptr() as usize, count, "release matched no live allocation");
        }
        released
    }

    fn needs_growth(&self) -> bool {
        let least_load = self.index.read().least_load();
        let average = self.demand.read().average;
        needs_growth(least_load, average, self.config.grow_watermark)
    }

    /// Grow one page at a time while the growth rule holds.
    ///
    /// Returns `true` when growth was needed but the page cap stopped it.
    pub(crate) fn provision(&self) -> bool {
        let mut grown = 0u64;
        let mut capped = false;
        while self.needs_growth() {
            if self.make_pages(1) == 0 {
                capped = true;
                break;
            }
            grown += 1;
        }
        if grown > 0 {
            self.stats.record_provisioned(grown);
            info!(
                pages = grown,
                total = self.index.read().len(),
                "provisioner grew pool"
            );
        }
        capped
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    /// Bytes per page.
    pub page_size: usize,
    /// Slot alignment.
    pub alignment: usize,
    /// Number of pages.
    pub pages: usize,
    /// Page loads, ascending.
    pub loads: Vec<f64>,
    /// Bytes in occupied slots.
    pub occupied_bytes: usize,
    /// Total bytes across pages.
    pub capacity_bytes: usize,
    /// Demand statistics.
    pub demand: Demand,
    /// Usage counters.
    pub stats: PoolStats,
}

/// An owning, self-growing collection of [`Page`]s.
///
/// `occupy` packs each request into the most-loaded page that still has
/// room, leaving sparse pages for larger requests. A background provisioner
/// (unless disabled in [`PoolConfig`]) adds pages ahead of demand.
///
/// Memory handed out is valid until released or until the pool is dropped.
///
/// The page index is allocated through `A`, which defaults to the global
/// allocator; see [`Pool::with_config_in`]. Page storage always comes from
/// the global allocator.
///
/// # Example
/// ```
/// use pagepool::{Pool, PoolConfig};
///
/// let pool = Pool::<4096, 16>::with_config(PoolConfig::manual().with_initial_pages(1)).unwrap();
/// let ptr = pool.occupy::<u64>(8).unwrap();
/// assert!(pool.release(ptr, 8));
/// ```
pub struct Pool<const SIZE: usize, const ALIGN: usize, A: Allocator = Global> {
    shared: Arc<Shared<SIZE, ALIGN, A>>,
    provisioner: Option<Provisioner>,
}

impl<const SIZE: usize, const ALIGN: usize> Pool<SIZE, ALIGN> {
    /// Create a pool with the default configuration.
    pub fn new() -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool, build its initial pages, and start the provisioner.
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_config_in(config, Global)
    }
}

impl<const SIZE: usize, const ALIGN: usize, A> Pool<SIZE, ALIGN, A>
where
    A: Allocator + Clone + Send + Sync + 'static,
{
    /// Like [`Pool::with_config`], with the page index allocated in `alloc`.
    pub fn with_config_in(config: PoolConfig, alloc: A) -> Result<Self, PoolError> {
        config.validate()?;

        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let auto_grow = config.auto_grow;
        let initial = config.initial_pages;
        let shared = Arc::new(Shared {
            index: RwLock::new(PageIndex::new_in(alloc)),
            demand: RwLock::new(Demand::default()),
            stats: AtomicPoolStats::new(),
            config,
            wake: wake_tx,
        });
        shared.make_pages(initial);

        let provisioner = if auto_grow {
            Some(Provisioner::spawn(Arc::clone(&shared), wake_rx).map_err(PoolError::Spawn)?)
        } else {
            None
        };

        Ok(Self {
            shared,
            provisioner,
        })
    }

    /// Add up to `count` empty pages, returning how many were added.
    pub fn make_pages(&self, count: usize) -> usize {
        self.shared.make_pages(count)
    }

    /// Allocate room for `count` values of `T`.
    ///
    /// Returns `None` when no page can hold the request. Every call, hit or
    /// miss, feeds the demand average the provisioner grows against.
    pub fn occupy<T>(&self, count: usize) -> Option<NonNull<T>> {
        self.shared.occupy(count)
    }

    /// Release an allocation made by [`Pool::occupy`] with the same `T` and
    /// `count`. Returns `false`, changing nothing, if it matches no live
    /// allocation.
    pub fn release<T>(&self, ptr: NonNull<T>, count: usize) -> bool {
        self.shared.release(ptr, count)
    }

    /// Number of pages owned.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.shared.index.read().len()
    }

    /// Page loads, ascending.
    #[must_use]
    pub fn loads(&self) -> Vec<f64> {
        self.shared.index.read().loads()
    }

    /// Mean requested load per `occupy` call.
    #[must_use]
    pub fn average_demand(&self) -> f64 {
        self.shared.demand.read().average
    }

    /// Number of `occupy` calls so far.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.shared.demand.read().requests
    }

    /// Usage counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.stats.snapshot()
    }

    /// Zero the usage counters. Demand statistics are kept.
    pub fn reset_stats(&self) {
        self.shared.stats.reset();
    }

    /// Configuration the pool was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Whether a provisioner thread is running.
    #[must_use]
    pub fn is_provisioning(&self) -> bool {
        self.provisioner.is_some()
    }

    /// Capture loads, demand, and counters.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        let (loads, occupied_slots) = {
            let index = self.shared.index.read();
            (index.loads(), index.occupied_slots())
        };
        let demand = *self.shared.demand.read();
        PoolSnapshot {
            page_size: SIZE,
            alignment: ALIGN,
            pages: loads.len(),
            capacity_bytes: loads.len() * SIZE,
            loads,
            occupied_bytes: occupied_slots * ALIGN,
            demand,
            stats: self.stats(),
        }
    }
}

impl<const SIZE: usize, const ALIGN: usize, A: Allocator> Drop for Pool<SIZE, ALIGN, A> {
    fn drop(&mut self) {
        if let Some(mut provisioner) = self.provisioner.take() {
            provisioner.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    type TenSlotPool = Pool<160, 16>;

    fn manual(pages: usize) -> TenSlotPool {
        Pool::with_config(PoolConfig::manual().with_initial_pages(pages)).unwrap()
    }

    fn approx(loads: &[f64], expected: &[f64]) -> bool {
        loads.len() == expected.len()
            && loads
                .iter()
                .zip(expected)
                .all(|(a, b)| (a - b).abs() < 1e-9)
    }

    #[test]
    fn empty_pool_returns_none() {
        let pool = manual(0);
        assert!(pool.occupy::<u8>(1).is_none());
        assert_eq!(pool.stats().misses, 1);
        assert_eq!(pool.requests(), 1);
    }

    #[test]
    fn make_pages_respects_cap() {
        let pool: TenSlotPool =
            Pool::with_config(PoolConfig::manual().with_max_pages(2)).unwrap();
        assert_eq!(pool.make_pages(5), 2);
        assert_eq!(pool.page_count(), 2);
        assert_eq!(pool.make_pages(1), 0);
    }

    #[test]
    fn packing_prefers_most_loaded_page_with_room() {
        let pool = manual(3);

        let seven = pool.occupy::<u8>(7 * 16).unwrap();
        let five = pool.occupy::<u8>(5 * 16).unwrap();
        let nine = pool.occupy::<u8>(9 * 16).unwrap();
        let one = pool.occupy::<u8>(16).unwrap();
        assert!(approx(&pool.loads(), &[0.5, 0.7, 1.0]));
        assert!(pool.release(nine, 9 * 16));
        assert!(approx(&pool.loads(), &[0.1, 0.5, 0.7]));

        let two = pool.occupy::<u8>(2 * 16).unwrap();
        assert!(approx(&pool.loads(), &[0.1, 0.5, 0.9]));

        for (ptr, bytes) in [(seven, 7), (five, 5), (one, 1), (two, 2)] {
            assert!(pool.release(ptr, bytes * 16));
        }
        assert!(approx(&pool.loads(), &[0.0, 0.0, 0.0]));
    }

    #[test]
    fn demand_average_counts_misses() {
        let pool = manual(1);
        assert!(pool.occupy::<u8>(16).is_some());
        assert!(pool.occupy::<u8>(48).is_some());
        assert!(pool.occupy::<u8>(320).is_none());
        assert_eq!(pool.requests(), 3);
        assert!((pool.average_demand() - (0.1 + 0.3 + 2.0) / 3.0).abs() < 1e-9);
        let stats = pool.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[test]
    fn release_rejects_unknown_pointers() {
        let pool = manual(1);
        let ptr = pool.occupy::<u32>(4).unwrap();
        assert!(!pool.release(ptr, 8));
        let stray = NonNull::new(0x10 as *mut u32).unwrap();
        assert!(!pool.release(stray, 4));
        assert!(pool.release(ptr, 4));
        assert!(!pool.release(ptr, 4));
        let stats = pool.stats();
        assert_eq!((stats.releases, stats.rejected_releases), (1, 3));
    }

    #[test]
    fn provisioner_creates_first_page() {
        let pool: TenSlotPool = Pool::new().unwrap();
        assert!(pool.is_provisioning());
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.page_count() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(pool.page_count() >= 1);
    }

    #[test]
    fn provisioner_grows_under_pressure() {
        let pool: TenSlotPool = Pool::with_config(
            PoolConfig::default()
                .with_initial_pages(1)
                .with_max_pages(8),
        )
        .unwrap();
        let _a = pool.occupy::<u8>(6 * 16).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.page_count() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pool.page_count(), 2);
        assert!(pool.stats().provisioned_pages >= 1);
    }

    #[test]
    fn occupy_wakes_provisioner_before_poll_interval() {
        let pool: TenSlotPool = Pool::with_config(
            PoolConfig::default()
                .with_initial_pages(1)
                .with_max_pages(8)
                .with_poll_interval(Duration::from_secs(30)),
        )
        .unwrap();
        let started = Instant::now();
        let _a = pool.occupy::<u8>(6 * 16).unwrap();

        let deadline = started + Duration::from_secs(5);
        while pool.page_count() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pool.page_count(), 2);
        assert!(started.elapsed() < Duration::from_secs(5));

        let dropping = Instant::now();
        drop(pool);
        assert!(dropping.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn reset_stats_keeps_demand() {
        let pool = manual(1);
        let ptr = pool.occupy::<u8>(16).unwrap();
        assert!(pool.release(ptr, 16));
        assert!(!pool.release(ptr, 16));

        pool.reset_stats();
        assert_eq!(pool.stats(), PoolStats::default());
        assert_eq!(pool.requests(), 1);
        assert!(pool.occupy::<u8>(16).is_some());
        assert_eq!(pool.stats().hits, 1);
    }

    #[test]
    fn snapshot_reports_capacity() {
        let pool = manual(2);
        let _a = pool.occupy::<u8>(40).unwrap();
        let snap = pool.snapshot();
        assert_eq!(snap.pages, 2);
        assert_eq!(snap.capacity_bytes, 320);
        assert_eq!(snap.occupied_bytes, 48);
        assert_eq!(snap.demand.requests, 1);
        assert_eq!(snap.stats.hits, 1);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["page_size"], 160);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = TenSlotPool::with_config(PoolConfig::default().with_grow_watermark(0.0));
        assert!(matches!(result, Err(PoolError::Config(_))));
    }
}
