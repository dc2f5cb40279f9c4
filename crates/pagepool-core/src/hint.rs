//! Page identity and page-scoped search cursors.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(u64);

impl PageId {
    /// Largest possible id, useful as an upper range bound.
    pub const MAX: Self = Self(u64::MAX);

    /// Allocate a fresh id.
    pub(crate) fn next() -> Self {
        Self(NEXT_PAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

/// A cached search result naming one head within one page.
///
/// A hint stays usable only while the owning page has not touched that head.
/// Pages re-check it before use and reject it otherwise; holding a hint
/// grants no exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Hint {
    pub(crate) page: PageId,
    pub(crate) index: usize,
    pub(crate) seq: u64,
}

impl Hint {
    pub(crate) fn new(page: PageId, index: usize, seq: u64) -> Self {
        Self { page, index, seq }
    }

    /// The page this hint was produced by.
    pub fn page(&self) -> PageId {
        self.page
    }

    /// Slot index of the head.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hint({}, slot={}, seq={})", self.page, self.index, self.seq)
    }
}
