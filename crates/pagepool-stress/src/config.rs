//! Stress run configuration from CLI flags and environment.

use std::time::Duration;

use clap::Parser;

use pagepool::config::DEFAULT_PROBE_LIMIT;
use pagepool::PoolConfig;

/// pagepool-stress: hammer a page pool from many threads.
#[derive(Parser, Debug, Clone)]
#[command(name = "pagepool-stress", version, about)]
pub struct StressConfig {
    /// Worker threads.
    #[arg(short, long, default_value = "4", env = "PAGEPOOL_THREADS")]
    pub threads: usize,

    /// Occupy attempts per thread.
    #[arg(short, long, default_value = "10000", env = "PAGEPOOL_ITERATIONS")]
    pub iterations: usize,

    /// Bytes per block.
    #[arg(short, long, default_value = "256", env = "PAGEPOOL_BLOCK_BYTES")]
    pub block_bytes: usize,

    /// Live blocks a thread holds before releasing them all.
    #[arg(long, default_value = "16")]
    pub hold: usize,

    /// Pages created before the run starts.
    #[arg(long, default_value = "0", env = "PAGEPOOL_INITIAL_PAGES")]
    pub initial_pages: usize,

    /// Page cap.
    #[arg(long, env = "PAGEPOOL_MAX_PAGES")]
    pub max_pages: Option<usize>,

    /// Growth watermark in (0, 1].
    #[arg(long, default_value = "1.0", env = "PAGEPOOL_WATERMARK")]
    pub watermark: f64,

    /// Provisioner poll interval (e.g. "10ms", "1s").
    #[arg(long, default_value = "10ms", env = "PAGEPOOL_POLL")]
    pub poll: String,

    /// Disable the background provisioner.
    #[arg(long)]
    pub no_grow: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl StressConfig {
    /// Parse CLI arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Poll interval, falling back to 10ms on a malformed value.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        parse_duration(&self.poll).unwrap_or(Duration::from_millis(10))
    }

    /// Pool configuration for this run.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            initial_pages: self.initial_pages,
            max_pages: self.max_pages,
            grow_watermark: self.watermark,
            poll_interval: self.poll_interval(),
            occupy_probe_limit: DEFAULT_PROBE_LIMIT,
            auto_grow: !self.no_grow,
        }
    }
}

/// Parse a duration string like "10ms", "5s", "1m".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let n: u64 = ms.parse().ok()?;
        Some(Duration::from_millis(n))
    } else if let Some(secs) = s.strip_suffix('s') {
        let n: u64 = secs.parse().ok()?;
        Some(Duration::from_secs(n))
    } else if let Some(mins) = s.strip_suffix('m') {
        let n: u64 = mins.parse().ok()?;
        Some(Duration::from_secs(n * 60))
    } else {
        let n: u64 = s.parse().ok()?;
        Some(Duration::from_millis(n))
    }
}
