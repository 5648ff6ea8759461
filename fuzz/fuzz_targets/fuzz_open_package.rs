#![no_main]

use libfuzzer_sys::fuzz_target;
use sheetpack::{Document, Options, PackageLimits};

fuzz_target!(|data: &[u8]| {
    let options = Options::default().with_limits(PackageLimits {
        max_part_bytes: 1024 * 1024,
        max_total_bytes: 4 * 1024 * 1024,
    });
    let Ok(doc) = Document::from_bytes(data, &options) else {
        return;
    };

    // Touch every sheet so the write path re-encodes decoded models, not just raw bytes.
    if let Ok(names) = doc.sheet_names() {
        for name in names {
            let _ = doc.worksheet_by_name(&name);
        }
    }
    let _ = doc.write_to_buffer(&Options::default());
});
