//! # pagepool-core
//!
//! Single-page allocation engine for `pagepool`.
//!
//! A [`Page`] is a fixed byte arena split into alignment-sized slots. Runs of
//! slots are tracked in a side array of [`BlockHeader`]s, so pointers handed to
//! callers carry no inline metadata. [`Hint`]s cache a search result and are
//! re-validated by the page before every use.
#![warn(missing_docs)]

pub mod header;
pub mod hint;
pub mod page;

pub use header::{BlockHeader, RunKind};
pub use hint::{Hint, PageId};
pub use page::{LayoutError, Page, Run};
