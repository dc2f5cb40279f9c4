//! Fixed-capacity page with a side-array free list.
//!
//! A [`Page`] splits `SIZE` bytes into `SIZE / ALIGN` slots and tracks runs of
//! slots through a parallel array of [`BlockHeader`]s. Allocation is first-fit
//! over run heads; occupying a larger run splits off the remainder, releasing
//! a run merges it with free neighbours on both sides.
//!
//! The page never dereferences the memory it hands out. Returned pointers are
//! aligned to `ALIGN` and stay valid until released or until the page is
//! dropped.

use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use crate::header::BlockHeader;
use crate::hint::{Hint, PageId};

/// A contiguous run of slots as seen from its head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// Slot index of the head.
    pub start: usize,
    /// Length in slots.
    pub len: usize,
    /// Whether the run is free.
    pub free: bool,
}

/// A broken header invariant, reported by [`Page::verify`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// A slot was reached while walking heads but is not a head.
    #[error("slot {slot} is reached by the head walk but is not a head")]
    Gap {
        /// Offending slot.
        slot: usize,
    },
    /// A head lies inside another run.
    #[error("slot {slot} is a head inside the run starting at {owner}")]
    Overlap {
        /// Offending slot.
        slot: usize,
        /// Head of the enclosing run.
        owner: usize,
    },
    /// A run extends beyond the last slot.
    #[error("run at slot {slot} overruns the page")]
    Overrun {
        /// Offending head.
        slot: usize,
    },
    /// A head's backward index does not name the preceding head.
    #[error("slot {slot} links back to {found:?}, expected {expected:?}")]
    BrokenLink {
        /// Offending head.
        slot: usize,
        /// Head of the preceding run.
        expected: Option<usize>,
        /// Recorded backward index.
        found: Option<usize>,
    },
    /// Two free runs sit next to each other.
    #[error("free runs at {first} and {second} were not coalesced")]
    Uncoalesced {
        /// Earlier free head.
        first: usize,
        /// Later free head.
        second: usize,
    },
    /// The occupied counter disagrees with the headers.
    #[error("occupied slot counter is {recorded}, headers account for {counted}")]
    LoadMismatch {
        /// Value of the counter.
        recorded: usize,
        /// Sum over occupied heads.
        counted: usize,
    },
}

/// A `SIZE`-byte arena carved into `ALIGN`-byte slots.
///
/// `SIZE` must be non-zero and `ALIGN` a power of two dividing `SIZE`; both
/// are checked at compile time when a page is constructed.
pub struct Page<const SIZE: usize, const ALIGN: usize> {
    id: PageId,
    storage: Vec<u8>,
    offset: usize,
    headers: Box<[BlockHeader]>,
    occupied: usize,
}

impl<const SIZE: usize, const ALIGN: usize> Page<SIZE, ALIGN> {
    /// Number of slots in the page.
    pub const SLOTS: usize = SIZE / ALIGN;

    /// Create an empty page with a single free run.
    #[must_use]
    pub fn new() -> Self {
        const {
            assert!(SIZE > 0, "page size must be non-zero");
            assert!(ALIGN.is_power_of_two(), "page alignment must be a power of two");
            assert!(SIZE % ALIGN == 0, "page alignment must divide page size");
        }

        let storage = vec![0u8; SIZE + ALIGN - 1];
        let addr = storage.as_ptr() as usize;
        let offset = addr.next_multiple_of(ALIGN) - addr;

        let mut headers = vec![BlockHeader::default(); Self::SLOTS].into_boxed_slice();
        headers[0].make_head(true, Self::SLOTS);

        Self {
            id: PageId::next(),
            storage,
            offset,
            headers,
            occupied: 0,
        }
    }

    /// Identity of this page, embedded in every hint it produces.
    #[must_use]
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Slots needed to hold `count` values of `T`.
    ///
    /// `None` when `T` needs a stricter alignment than the page offers or the
    /// byte size overflows. Zero-byte requests still take one slot so that
    /// every allocation has a distinct address.
    #[must_use]
    pub fn slots_for<T>(count: usize) -> Option<usize> {
        if align_of::<T>() > ALIGN {
            return None;
        }
        let bytes = size_of::<T>().checked_mul(count)?;
        Some(bytes.div_ceil(ALIGN).max(1))
    }

    /// Fraction of the page that `count` values of `T` would fill.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn load_of<T>(count: usize) -> f64 {
        size_of::<T>() as f64 * count as f64 / SIZE as f64
    }

    /// Load expressed by a number of slots.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn slots_load(slots: usize) -> f64 {
        slots as f64 / Self::SLOTS as f64
    }

    /// Upper bound of [`Page::load`].
    #[must_use]
    pub const fn max_load() -> f64 {
        1.0
    }

    /// Occupied fraction of the page, in `[0, max_load()]`.
    #[must_use]
    pub fn load(&self) -> f64 {
        Self::slots_load(self.occupied)
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied_slots(&self) -> usize {
        self.occupied
    }

    /// Number of free slots, fragmented or not.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        Self::SLOTS - self.occupied
    }

    /// Address of the first usable byte.
    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.storage.as_ptr() as usize + self.offset
    }

    /// Whether `addr` points into this page's usable window.
    #[must_use]
    pub fn owns_addr(&self, addr: usize) -> bool {
        let base = self.base_addr();
        addr >= base && addr - base < SIZE
    }

    /// Whether `hint` still names a head of this page.
    #[must_use]
    pub fn is_current(&self, hint: &Hint) -> bool {
        self.resolve(hint).is_some()
    }

    /// First free run large enough for `count` values of `T`.
    pub fn fit<T>(&self, count: usize) -> Option<Hint> {
        let needed = Self::slots_for::<T>(count)?;
        let mut index = 0;
        while index < Self::SLOTS {
            let header = &self.headers[index];
            debug_assert!(header.is_head(), "head walk reached interior slot {index}");
            if header.is_free() && header.len() >= needed {
                return Some(Hint::new(self.id, index, header.seq()));
            }
            index += header.len().max(1);
        }
        None
    }

    /// Recover the hint of a live allocation from its pointer.
    ///
    /// The extent must lie inside the page, start on a slot boundary, and
    /// match an occupied run of exactly the slots `count` values of `T` take.
    pub fn contains<T>(&self, ptr: NonNull<T>, count: usize) -> Option<Hint> {
        let needed = Self::slots_for::<T>(count)?;
        let bytes = size_of::<T>() * count;

        let offset = (ptr.as_ptr() as usize).checked_sub(self.base_addr())?;
        if offset >= SIZE || offset % ALIGN != 0 || offset.checked_add(bytes)? > SIZE {
            return None;
        }

        let index = offset / ALIGN;
        let header = &self.headers[index];
        (header.is_occupied() && header.len() == needed)
            .then(|| Hint::new(self.id, index, header.seq()))
    }

    /// Occupy the first run that fits `count` values of `T`.
    pub fn try_occupy<T>(&mut self, count: usize) -> Option<NonNull<T>> {
        let hint = self.fit::<T>(count)?;
        self.try_occupy_with(count, &hint)
    }

    /// Occupy the run named by `hint`, splitting off any surplus.
    ///
    /// Returns `None` without touching the page when the hint is stale,
    /// belongs to another page, or names a run that is occupied or too short.
    pub fn try_occupy_with<T>(&mut self, count: usize, hint: &Hint) -> Option<NonNull<T>> {
        let needed = Self::slots_for::<T>(count)?;
        let index = self.resolve(hint)?;

        let run = self.headers[index].len();
        if !self.headers[index].is_free() || run < needed {
            return None;
        }
        let ptr = self.slot_ptr::<T>(index)?;

        if run > needed {
            let rest = index + needed;
            self.headers[rest].make_head(true, run - needed);
            self.headers[rest].set_prev(Some(index));
            let after = index + run;
            if after < Self::SLOTS {
                self.headers[after].set_prev(Some(rest));
            }
        }
        self.headers[index].make_head(false, needed);
        self.occupied += needed;

        Some(ptr)
    }

    /// Release the allocation at `ptr` holding `count` values of `T`.
    pub fn release<T>(&mut self, ptr: NonNull<T>, count: usize) -> bool {
        match self.contains(ptr, count) {
            Some(hint) => self.release_hint(&hint),
            None => false,
        }
    }

    /// Release the occupied run named by `hint` and merge free neighbours.
    ///
    /// Returns `false` without touching the page when the hint does not
    /// resolve to an occupied head.
    pub fn release_hint(&mut self, hint: &Hint) -> bool {
        let Some(index) = self.resolve(hint) else {
            return false;
        };
        if !self.headers[index].is_occupied() {
            return false;
        }

        let mut len = self.headers[index].len();
        let prev = self.headers[index].prev();
        self.occupied -= len;

        let next = index + len;
        if next < Self::SLOTS && self.headers[next].is_free() {
            len += self.headers[next].len();
            self.headers[next].remove_head();
        }
        self.headers[index].make_head(true, len);

        let mut head = index;
        if let Some(prev) = prev.filter(|&p| self.headers[p].is_free()) {
            let merged = self.headers[prev].len() + len;
            self.headers[prev].make_head(true, merged);
            self.headers[index].remove_head();
            head = prev;
        }

        let after = head + self.headers[head].len();
        if after < Self::SLOTS {
            self.headers[after].set_prev(Some(head));
        }
        true
    }

    /// Runs in address order.
    pub fn runs(&self) -> impl Iterator<Item = Run> + '_ {
        let mut index = 0;
        std::iter::from_fn(move || {
            if index >= Self::SLOTS {
                return None;
            }
            let header = &self.headers[index];
            let run = Run {
                start: index,
                len: header.len(),
                free: header.is_free(),
            };
            index += header.len().max(1);
            Some(run)
        })
    }

    /// Length of the longest free run, in slots.
    #[must_use]
    pub fn largest_free_run(&self) -> usize {
        self.runs()
            .filter(|run| run.free)
            .map(|run| run.len)
            .max()
            .unwrap_or(0)
    }

    /// Check that heads tile the page, links are consistent, no two free
    /// runs touch, and the occupied counter matches.
    pub fn verify(&self) -> Result<(), LayoutError> {
        let mut index = 0;
        let mut prev: Option<usize> = None;
        let mut counted = 0;

        while index < Self::SLOTS {
            let header = &self.headers[index];
            if !header.is_head() {
                return Err(LayoutError::Gap { slot: index });
            }
            if header.prev() != prev {
                return Err(LayoutError::BrokenLink {
                    slot: index,
                    expected: prev,
                    found: header.prev(),
                });
            }
            if let Some(p) = prev.filter(|&p| header.is_free() && self.headers[p].is_free()) {
                return Err(LayoutError::Uncoalesced {
                    first: p,
                    second: index,
                });
            }

            let end = index + header.len();
            if end > Self::SLOTS {
                return Err(LayoutError::Overrun { slot: index });
            }
            if let Some(slot) = (index + 1..end).find(|&s| self.headers[s].is_head()) {
                return Err(LayoutError::Overlap { slot, owner: index });
            }
            if header.is_occupied() {
                counted += header.len();
            }

            prev = Some(index);
            index = end;
        }

        if counted != self.occupied {
            return Err(LayoutError::LoadMismatch {
                recorded: self.occupied,
                counted,
            });
        }
        Ok(())
    }

    fn resolve(&self, hint: &Hint) -> Option<usize> {
        if hint.page != self.id || hint.index >= Self::SLOTS {
            return None;
        }
        let header = &self.headers[hint.index];
        (header.is_head() && header.seq() == hint.seq).then_some(hint.index)
    }

    #[allow(clippy::cast_ptr_alignment)]
    fn slot_ptr<T>(&mut self, index: usize) -> Option<NonNull<T>> {
        let byte = self
            .storage
            .as_mut_ptr()
            .wrapping_add(self.offset + index * ALIGN);
        NonNull::new(byte.cast::<T>())
    }
}

impl<const SIZE: usize, const ALIGN: usize> Default for Page<SIZE, ALIGN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize, const ALIGN: usize> fmt::Debug for Page<SIZE, ALIGN> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("size", &SIZE)
            .field("align", &ALIGN)
            .field("occupied_slots", &self.occupied)
            .field("runs", &self.runs().count())
            .finish()
    }
}
