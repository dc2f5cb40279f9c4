//! Pool counters and demand statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters describing pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Successful `occupy` calls.
    pub hits: u64,
    /// `occupy` calls that returned no memory.
    pub misses: u64,
    /// Successful `release` calls.
    pub releases: u64,
    /// `release` calls that matched no live allocation.
    pub rejected_releases: u64,
    /// Pages added by the background provisioner.
    pub provisioned_pages: u64,
}

/// Atomic counters for lock-free updates from any caller thread.
#[derive(Debug)]
pub struct AtomicPoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
    releases: AtomicU64,
    rejected_releases: AtomicU64,
    provisioned_pages: AtomicU64,
}

impl AtomicPoolStats {
    /// Create new zeroed stats.
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            rejected_releases: AtomicU64::new(0),
            provisioned_pages: AtomicU64::new(0),
        }
    }

    /// Take a snapshot of current stats.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            rejected_releases: self.rejected_releases.load(Ordering::Relaxed),
            provisioned_pages: self.provisioned_pages.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.releases.store(0, Ordering::Relaxed);
        self.rejected_releases.store(0, Ordering::Relaxed);
        self.provisioned_pages.store(0, Ordering::Relaxed);
    }

    /// Record the outcome of an `occupy` call.
    pub fn record_occupy(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a `release` call.
    pub fn record_release(&self, accepted: bool) {
        let counter = if accepted {
            &self.releases
        } else {
            &self.rejected_releases
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record pages added by the provisioner.
    pub fn record_provisioned(&self, pages: u64) {
        self.provisioned_pages.fetch_add(pages, Ordering::Relaxed);
    }
}

impl Default for AtomicPoolStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Cumulative average of requested load per `occupy` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Demand {
    /// Mean requested load over all calls.
    pub average: f64,
    /// Number of `occupy` calls observed.
    pub requests: u64,
}

impl Demand {
    /// Fold one request into the running average.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, load: f64) {
        let before = self.requests as f64;
        self.requests += 1;
        self.average = (self.average * before + load) / self.requests as f64;
    }
}
