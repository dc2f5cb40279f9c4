#![no_main]

use libfuzzer_sys::fuzz_target;

use pagepool_core::Page;

type FuzzPage = Page<1024, 16>;

fuzz_target!(|data: &[u8]| {
    let mut page = FuzzPage::new();
    let mut hints = Vec::new();

    // Hints are collected and then replayed after the layout changes.
    // A replayed hint must either be rejected or leave a valid page.
    for &byte in data {
        let count = usize::from(byte % 32);
        match byte >> 6 {
            0 => {
                if let Some(hint) = page.fit::<u8>(count * 8) {
                    hints.push(hint);
                }
            }
            1 => {
                if let Some(hint) = hints.pop() {
                    let _ = page.try_occupy_with::<u8>(count * 8, &hint);
                }
            }
            2 => {
                if let Some(hint) = hints.pop() {
                    let _ = page.release_hint(&hint);
                }
            }
            _ => {
                let _ = page.try_occupy::<u64>(count);
            }
        }
        assert!(page.verify().is_ok());
    }
});
