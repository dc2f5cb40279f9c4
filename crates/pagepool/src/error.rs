//! Error types for pool construction.
//!
//! Allocation paths never error; they report exhaustion or mismatches with
//! `None` and `false`. Only building a pool can fail.

/// Invalid [`PoolConfig`](crate::PoolConfig) value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Growth watermark outside `(0, 1]`.
    #[error("grow watermark must be in (0, 1], got {0}")]
    Watermark(f64),

    /// Poll interval of zero would spin the provisioner.
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,

    /// `occupy` must try at least one page.
    #[error("occupy probe limit must be at least 1")]
    ZeroProbeLimit,

    /// More initial pages than the cap allows.
    #[error("initial pages ({initial}) exceed max pages ({max})")]
    InitialExceedsMax {
        /// Requested initial pages.
        initial: usize,
        /// Configured cap.
        max: usize,
    },
}

/// Error building a [`Pool`](crate::Pool).
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Configuration rejected.
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),

    /// The provisioner thread could not be started.
    #[error("failed to spawn provisioner thread: {0}")]
    Spawn(#[source] std::io::Error),
}
