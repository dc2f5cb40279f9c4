//! Load-ordered page ownership with an address side index.
//!
//! Pages live in a vector sorted by `(occupied slots, page id)`, so the
//! first entry is the least-loaded page and a partition point selects "the
//! fullest page that still has room". A second sorted vector from base
//! address to the current key resolves bare pointers back to their page.
//! Both vectors are allocated through the index allocator `A`; page storage
//! itself always comes from the global allocator.
//!
//! A page is only mutated while removed from the index; [`PageIndex::with_page`]
//! reinserts it under its new key before returning.

use std::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Global};
use allocator_api2::vec::Vec as AllocVec;

use pagepool_core::{Page, PageId};

/// Ordering key of a page inside the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct LoadKey {
    occupied: usize,
    id: PageId,
}

impl LoadKey {
    fn of<const SIZE: usize, const ALIGN: usize>(page: &Page<SIZE, ALIGN>) -> Self {
        Self {
            occupied: page.occupied_slots(),
            id: page.id(),
        }
    }
}

pub(crate) struct PageIndex<const SIZE: usize, const ALIGN: usize, A: Allocator = Global> {
    by_load: AllocVec<(LoadKey, Page<SIZE, ALIGN>), A>,
    by_addr: AllocVec<(usize, LoadKey), A>,
}

impl<const SIZE: usize, const ALIGN: usize> PageIndex<SIZE, ALIGN> {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<const SIZE: usize, const ALIGN: usize, A: Allocator> PageIndex<SIZE, ALIGN, A> {
    pub(crate) fn new_in(alloc: A) -> Self
    where
        A: Clone,
    {
        Self {
            by_load: AllocVec::new_in(alloc.clone()),
            by_addr: AllocVec::new_in(alloc),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_load.len()
    }

    pub(crate) fn insert(&mut self, page: Page<SIZE, ALIGN>) {
        let key = LoadKey::of(&page);
        let base = page.base_addr();
        match self.by_addr.binary_search_by_key(&base, |&(addr, _)| addr) {
            Ok(at) => self.by_addr[at].1 = key,
            Err(at) => self.by_addr.insert(at, (base, key)),
        }
        let at = self.by_load.partition_point(|(other, _)| *other < key);
        self.by_load.insert(at, (key, page));
    }

    /// Remove the page under `key`, run `f` on it, and reinsert it under its
    /// updated load.
    pub(crate) fn with_page<R>(
        &mut self,
        key: LoadKey,
        f: impl FnOnce(&mut Page<SIZE, ALIGN>) -> R,
    ) -> Option<R> {
        let at = self
            .by_load
            .binary_search_by(|(other, _)| other.cmp(&key))
            .ok()?;
        let (_, mut page) = self.by_load.remove(at);
        let result = f(&mut page);
        self.insert(page);
        Some(result)
    }

    /// Load of the least-loaded page, `None` when empty.
    pub(crate) fn least_load(&self) -> Option<f64> {
        self.by_load
            .first()
            .map(|(key, _)| Page::<SIZE, ALIGN>::slots_load(key.occupied))
    }

    /// Loads of all pages, ascending.
    pub(crate) fn loads(&self) -> Vec<f64> {
        self.by_load.iter().map(|(_, page)| page.load()).collect()
    }

    pub(crate) fn occupied_slots(&self) -> usize {
        self.by_load.iter().map(|(key, _)| key.occupied).sum()
    }

    /// Occupy `count` values of `T` in the fullest page that has room.
    ///
    /// Candidates are pages whose occupied slots plus the request fit the
    /// page. They are tried from most to least loaded, at most `probe_limit`
    /// of them, since a page with enough free slots may still be too
    /// fragmented. The least-loaded candidate is always tried last.
    pub(crate) fn occupy<T>(&mut self, count: usize, probe_limit: usize) -> Option<NonNull<T>> {
        let needed = Page::<SIZE, ALIGN>::slots_for::<T>(count)?;
        let limit = Page::<SIZE, ALIGN>::SLOTS.checked_sub(needed)?;

        // A failed attempt leaves the page's key unchanged, so positions
        // below `end` stay valid across iterations.
        let mut end = self
            .by_load
            .partition_point(|(key, _)| key.occupied <= limit);
        let mut tried = 0;
        while end > 0 {
            let at = if tried < probe_limit { end - 1 } else { 0 };
            let key = self.by_load[at].0;
            if let Some(ptr) = self.with_page(key, |page| page.try_occupy::<T>(count))? {
                return Some(ptr);
            }
            if at == 0 {
                break;
            }
            end -= 1;
            tried += 1;
        }
        None
    }

    /// Key of the page whose usable window contains `addr`.
    pub(crate) fn owner_of(&self, addr: usize) -> Option<LoadKey> {
        let at = self.by_addr.partition_point(|&(base, _)| base <= addr);
        let (base, key) = *self.by_addr.get(at.checked_sub(1)?)?;
        (addr - base < SIZE).then_some(key)
    }

    /// Release through whichever page owns `ptr`.
    pub(crate) fn release<T>(&mut self, ptr: NonNull<T>, count: usize) -> bool {
        let Some(key) = self.owner_of(ptr.as_ptr() as usize) else {
            return false;
        };
        self.with_page(key, |page| page.release(ptr, count))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TenSlots = Page<160, 16>;

    fn page_with_slots(slots: usize) -> TenSlots {
        let mut page = TenSlots::new();
        if slots > 0 {
            page.try_occupy::<u8>(slots * 16).unwrap();
        }
        page
    }

    #[test]
    fn least_load_tracks_first_entry() {
        let mut index = PageIndex::<160, 16>::new();
        assert_eq!(index.least_load(), None);
        index.insert(page_with_slots(5));
        index.insert(page_with_slots(3));
        assert!((index.least_load().unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(index.len(), 2);
        assert_eq!(index.occupied_slots(), 8);
    }

    #[test]
    fn packs_into_fullest_page_with_room() {
        let mut index = PageIndex::<160, 16>::new();
        index.insert(page_with_slots(1));
        index.insert(page_with_slots(5));
        index.insert(page_with_slots(7));

        assert!(index.occupy::<u8>(32, 4).is_some());
        let loads = index.loads();
        assert_eq!(loads.len(), 3);
        assert!((loads[0] - 0.1).abs() < 1e-9);
        assert!((loads[1] - 0.5).abs() < 1e-9);
        assert!((loads[2] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn request_larger_than_any_headroom_fails() {
        let mut index = PageIndex::<160, 16>::new();
        index.insert(page_with_slots(5));
        index.insert(page_with_slots(7));
        assert!(index.occupy::<u8>(6 * 16, 4).is_none());
        assert!(index.occupy::<u8>(11 * 16, 4).is_none());
        assert_eq!(index.occupied_slots(), 12);
    }

    #[test]
    fn empty_index_yields_nothing() {
        let mut index = PageIndex::<160, 16>::new();
        assert!(index.occupy::<u8>(1, 4).is_none());
    }

    fn fragmented() -> TenSlots {
        let mut page = TenSlots::new();
        let blocks: Vec<_> = (0..10)
            .map(|_| page.try_occupy::<u8>(16).unwrap())
            .collect();
        for block in blocks.iter().step_by(2) {
            assert!(page.release(*block, 16));
        }
        assert_eq!(page.occupied_slots(), 5);
        assert_eq!(page.largest_free_run(), 1);
        page
    }

    #[test]
    fn fragmented_page_falls_back_to_next_candidate() {
        let mut index = PageIndex::<160, 16>::new();
        index.insert(fragmented());
        index.insert(fragmented());
        index.insert(page_with_slots(4));
        index.insert(page_with_slots(2));

        assert!(index.occupy::<u8>(48, 3).is_some());
        let loads = index.loads();
        assert!((loads[0] - 0.2).abs() < 1e-9);
        assert!((loads[1] - 0.5).abs() < 1e-9);
        assert!((loads[3] - 0.7).abs() < 1e-9);
    }

    #[test]
    fn least_loaded_page_is_tried_after_probe_limit() {
        let mut index = PageIndex::<160, 16>::new();
        for _ in 0..3 {
            index.insert(fragmented());
        }
        index.insert(TenSlots::new());

        assert!(index.occupy::<u8>(48, 2).is_some());
        let loads = index.loads();
        assert!((loads[0] - 0.3).abs() < 1e-9);
        assert_eq!(index.occupied_slots(), 18);
    }

    #[test]
    fn only_fragmented_pages_miss() {
        let mut index = PageIndex::<160, 16>::new();
        index.insert(fragmented());
        index.insert(fragmented());
        assert!(index.occupy::<u8>(48, 4).is_none());
        assert_eq!(index.occupied_slots(), 10);
    }

    #[test]
    fn release_finds_owner_by_address() {
        let mut index = PageIndex::<160, 16>::new();
        index.insert(TenSlots::new());
        index.insert(TenSlots::new());

        let a = index.occupy::<u64>(4, 4).unwrap();
        let b = index.occupy::<u64>(4, 4).unwrap();
        assert_eq!(index.occupied_slots(), 4);

        assert!(index.release(b, 4));
        assert!(index.release(a, 4));
        assert!(!index.release(a, 4));
        assert_eq!(index.occupied_slots(), 0);
    }

    #[test]
    fn owner_lookup_rejects_foreign_addresses() {
        let mut index = PageIndex::<160, 16>::new();
        let page = TenSlots::new();
        let base = page.base_addr();
        index.insert(page);

        assert!(index.owner_of(base).is_some());
        assert!(index.owner_of(base + 159).is_some());
        assert!(index.owner_of(base + 160).is_none());
        assert!(index.owner_of(base - 1).is_none());
    }
}
