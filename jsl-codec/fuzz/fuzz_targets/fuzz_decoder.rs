#![no_main]

use jsl_codec::{sniff, PathSelector, RecordDecoder};
use jsl_format::Limits;
use libfuzzer_sys::{arbitrary, fuzz_target};
use std::io::Cursor;

#[derive(arbitrary::Arbitrary, Debug)]
struct Input<'a> {
    window: u8,
    nested: bool,
    data: &'a [u8],
}

fuzz_target!(|input: Input<'_>| {
    let _ = sniff(&mut Cursor::new(input.data));

    let selector = if input.nested {
        PathSelector::parse("data.item", &Limits::default()).unwrap()
    } else {
        PathSelector::items()
    };
    let limits = Limits {
        max_depth: 64,
        max_record_bytes: 1 << 20,
        ..Limits::default()
    };
    let window = usize::from(input.window).max(1);
    let decoder = RecordDecoder::with_window(Cursor::new(input.data), selector, limits, window)
        .unwrap();
    for record in decoder {
        if record.is_err() {
            break;
        }
    }
});
