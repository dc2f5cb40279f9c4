//! # pagepool
//!
//! A pool of fixed-capacity pages for latency-sensitive allocation.
//!
//! Each [`Page`] manages variable-sized runs through a side-array free list
//! with splitting and coalescing. A [`Pool`] owns many pages ordered by load,
//! packs requests into the busiest page that still fits them, and runs a
//! background provisioner that adds pages before demand outruns capacity.
//!
//! The pool's page index can live in any [`Allocator`] from
//! `allocator-api2`, which works on stable Rust.
#![warn(missing_docs)]

pub mod config;
pub mod error;
mod index;
pub mod pool;
mod provision;
pub mod stats;

pub use allocator_api2::alloc::{Allocator, Global};
pub use config::PoolConfig;
pub use error::{ConfigError, PoolError};
pub use pagepool_core::{BlockHeader, Hint, LayoutError, Page, PageId, Run, RunKind};
pub use pool::{Pool, PoolSnapshot};
pub use stats::{Demand, PoolStats};
