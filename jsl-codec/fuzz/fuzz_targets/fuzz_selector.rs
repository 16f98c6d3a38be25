#![no_main]

use jsl_format::{Limits, PathSelector};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(selector) = PathSelector::parse(text, &Limits::default()) {
            assert_eq!(selector.as_str(), text);
            assert!(selector.depth() <= Limits::default().max_selector_segments);
        }
    }
});
