//! Per-slot run metadata.
//!
//! Every slot of a page has one [`BlockHeader`]. Only the first slot of a run
//! (its *head*) carries a non-zero length; slots absorbed into a run are
//! demoted to length zero. The heads therefore tile the slot array.

/// Whether a run is available or handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunKind {
    /// Available for allocation.
    #[default]
    Free,
    /// Handed out to a caller.
    Occupied,
}

/// Metadata for a single slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockHeader {
    kind: RunKind,
    len: usize,
    prev: Option<usize>,
    seq: u64,
}

impl BlockHeader {
    /// Make this slot the head of a run of `len` slots.
    ///
    /// The backward index is left untouched; callers repair it separately.
    pub fn make_head(&mut self, free: bool, len: usize) {
        debug_assert!(len > 0, "a head must span at least one slot");
        self.kind = if free {
            RunKind::Free
        } else {
            RunKind::Occupied
        };
        self.len = len;
        self.bump();
    }

    /// Demote this slot to an interior slot of a neighbouring run.
    pub fn remove_head(&mut self) {
        self.kind = RunKind::Free;
        self.len = 0;
        self.prev = None;
        self.bump();
    }

    /// Run length in slots (zero when this slot is not a head).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this slot is interior to some run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether this slot starts a run.
    #[must_use]
    pub fn is_head(&self) -> bool {
        self.len > 0
    }

    /// Whether this slot heads a free run.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.is_head() && self.kind == RunKind::Free
    }

    /// Whether this slot heads an occupied run.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.is_head() && self.kind == RunKind::Occupied
    }

    /// Head index of the preceding run, if any.
    #[must_use]
    pub fn prev(&self) -> Option<usize> {
        self.prev
    }

    /// Point the backward index at another head.
    pub fn set_prev(&mut self, prev: Option<usize>) {
        self.prev = prev;
    }

    /// Mutation sequence, bumped on every head state change.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn bump(&mut self) {
        self.seq = self.seq.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_not_a_head() {
        let header = BlockHeader::default();
        assert!(!header.is_head());
        assert!(!header.is_free());
        assert!(!header.is_occupied());
        assert_eq!(header.len(), 0);
        assert_eq!(header.prev(), None);
    }

    #[test]
    fn make_head_free_and_occupied() {
        let mut header = BlockHeader::default();
        header.make_head(true, 8);
        assert!(header.is_free());
        assert_eq!(header.len(), 8);

        header.make_head(false, 3);
        assert!(header.is_occupied());
        assert!(!header.is_free());
        assert_eq!(header.len(), 3);
    }

    #[test]
    fn remove_head_clears_backward_index() {
        let mut header = BlockHeader::default();
        header.make_head(true, 4);
        header.set_prev(Some(2));
        header.remove_head();
        assert!(header.is_empty());
        assert_eq!(header.prev(), None);
    }

    #[test]
    fn state_changes_bump_sequence() {
        let mut header = BlockHeader::default();
        let start = header.seq();
        header.make_head(true, 1);
        header.make_head(false, 1);
        header.remove_head();
        assert_eq!(header.seq(), start + 3);
    }

    #[test]
    fn set_prev_keeps_sequence() {
        let mut header = BlockHeader::default();
        header.make_head(true, 2);
        let seq = header.seq();
        header.set_prev(Some(0));
        assert_eq!(header.seq(), seq);
    }
}
