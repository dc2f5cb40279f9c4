//! Pool configuration and validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default fallback period between provisioner checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default number of pages `occupy` tries before reporting exhaustion.
pub const DEFAULT_PROBE_LIMIT: usize = 4;

/// Runtime knobs for a [`Pool`](crate::Pool).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pages created synchronously at construction.
    pub initial_pages: usize,
    /// Hard cap on the number of pages, if any.
    pub max_pages: Option<usize>,
    /// Grow once the least-loaded page plus the average request reaches this
    /// load. Must lie in `(0, 1]`.
    pub grow_watermark: f64,
    /// Provisioner re-check period when no wake-up arrives.
    pub poll_interval: Duration,
    /// Pages tried per `occupy` before giving up on fragmentation.
    pub occupy_probe_limit: usize,
    /// Run the background provisioner.
    pub auto_grow: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_pages: 0,
            max_pages: None,
            grow_watermark: 1.0,
            poll_interval: DEFAULT_POLL_INTERVAL,
            occupy_probe_limit: DEFAULT_PROBE_LIMIT,
            auto_grow: true,
        }
    }
}

impl PoolConfig {
    /// Configuration without the background provisioner.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            auto_grow: false,
            ..Self::default()
        }
    }

    /// Set the number of pages created at construction.
    #[must_use]
    pub fn with_initial_pages(mut self, pages: usize) -> Self {
        self.initial_pages = pages;
        self
    }

    /// Cap the number of pages.
    #[must_use]
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = Some(pages);
        self
    }

    /// Set the growth watermark.
    #[must_use]
    pub fn with_grow_watermark(mut self, watermark: f64) -> Self {
        self.grow_watermark = watermark;
        self
    }

    /// Set the provisioner fallback period.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check that all knobs are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.grow_watermark > 0.0 && self.grow_watermark <= 1.0) {
            return Err(ConfigError::Watermark(self.grow_watermark));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.occupy_probe_limit == 0 {
            return Err(ConfigError::ZeroProbeLimit);
        }
        if let Some(max) = self.max_pages {
            if self.initial_pages > max {
                return Err(ConfigError::InitialExceedsMax {
                    initial: self.initial_pages,
                    max,
                });
            }
        }
        Ok(())
    }
}
