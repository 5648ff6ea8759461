#![no_main]

use libfuzzer_sys::fuzz_target;
use sheetpack::parts::{
    CalcChain, Comments, ContentTypes, Drawing, Relationships, SharedStrings, StyleSheet, Theme,
    VmlDrawing, Workbook, Worksheet,
};
use sheetpack::PartCodec;

/// Parts are fully buffered by the loader; keep the harness in the same ballpark.
const MAX_INPUT_BYTES: usize = 256 * 1024;

fn exercise<T: PartCodec>(data: &[u8]) {
    let Ok(model) = T::decode(data) else {
        return;
    };
    // Anything that decodes must either re-encode to a decodable part or fail cleanly.
    if let Ok(bytes) = model.encode() {
        let _ = T::decode(&bytes);
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, data)) = data.split_first() else {
        return;
    };
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];

    match selector % 11 {
        0 => exercise::<CalcChain>(data),
        1 => exercise::<Comments>(data),
        2 => exercise::<ContentTypes>(data),
        3 => exercise::<Drawing>(data),
        4 => exercise::<VmlDrawing>(data),
        5 => exercise::<Workbook>(data),
        6 => exercise::<Worksheet>(data),
        7 => exercise::<Relationships>(data),
        8 => exercise::<SharedStrings>(data),
        9 => exercise::<StyleSheet>(data),
        _ => exercise::<Theme>(data),
    }
});
