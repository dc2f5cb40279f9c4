#![no_main]

use libfuzzer_sys::fuzz_target;
use std::ptr::NonNull;

use pagepool_core::Page;

type FuzzPage = Page<2048, 16>;

fuzz_target!(|data: &[u8]| {
    let mut page = FuzzPage::new();
    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

    // Each pair of bytes is one operation: even opcode occupies, odd releases.
    for op in data.chunks_exact(2) {
        if op[0] % 2 == 0 {
            let bytes = usize::from(op[1]) * 4;
            if let Some(ptr) = page.try_occupy::<u8>(bytes) {
                live.push((ptr, bytes));
            }
        } else if !live.is_empty() {
            let (ptr, bytes) = live.swap_remove(usize::from(op[1]) % live.len());
            assert!(page.release(ptr, bytes));
            assert!(!page.release(ptr, bytes));
        }
        assert!(page.verify().is_ok());
        assert!((0.0..=FuzzPage::max_load()).contains(&page.load()));
    }

    for (ptr, bytes) in live.drain(..) {
        assert!(page.release(ptr, bytes));
    }
    assert_eq!(page.occupied_slots(), 0);
    assert_eq!(page.largest_free_run(), FuzzPage::SLOTS);
});
