//! # pagepool-stress
//!
//! Multi-threaded stress driver for `pagepool`: workers occupy and release
//! blocks concurrently while a shared ledger checks that no two live
//! allocations overlap.
#![warn(missing_docs)]

pub mod app;
pub mod config;
