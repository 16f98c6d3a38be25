//! The decoder's buffer usage must not grow with document length

use jsl_codec::{DecoderMetrics, PathSelector, RecordDecoder};
use jsl_test_utils::{ArrayStream, RecordShape};

fn drain(count: u64, shape: RecordShape) -> DecoderMetrics {
    let mut decoder = RecordDecoder::new(ArrayStream::new(count, shape), PathSelector::items());
    let mut seen = 0u64;
    for record in decoder.by_ref() {
        record.expect("generated stream is valid JSON");
        seen += 1;
    }
    assert_eq!(seen, count);
    decoder.metrics()
}

#[test]
fn peak_buffer_independent_of_record_count() {
    let small = drain(10, RecordShape::Log);
    let large = drain(1_000_000, RecordShape::Log);

    assert_eq!(large.records_emitted, 1_000_000);
    assert_eq!(small.peak_depth, large.peak_depth);
    assert_eq!(small.window_bytes, large.window_bytes);
    // Only the digit count of ids and counters differs between the two runs.
    assert!(
        large.peak_buffer_bytes() <= small.peak_buffer_bytes() + 256,
        "small={} large={}",
        small.peak_buffer_bytes(),
        large.peak_buffer_bytes()
    );
    assert!(large.bytes_consumed > 50 * large.peak_buffer_bytes());
}

#[test]
fn nested_records_stay_bounded_by_depth() {
    let shallow = drain(1_000, RecordShape::Nested { levels: 2 });
    let deep = drain(1_000, RecordShape::Nested { levels: 40 });

    assert_eq!(shallow.peak_depth, 5);
    assert_eq!(deep.peak_depth, 43);
    assert!(deep.peak_buffer_bytes() > shallow.peak_buffer_bytes());
}
