//! Property tests comparing the incremental decoder with whole-document parsing

use jsl_codec::{PathSelector, RecordDecoder};
use jsl_format::Limits;
use jsl_test_utils::ChunkedReader;
use proptest::prelude::*;
use serde_json::{Map, Number, Value};
use std::io::Cursor;

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        any::<f64>().prop_filter_map("finite", |f| Number::from_f64(f).map(Value::Number)),
        any::<String>().prop_map(Value::String),
    ];
    leaf.prop_recursive(6, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{0,6}", inner), 0..8)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn decode_all(bytes: &[u8], selector: &str, window: usize) -> Vec<Value> {
    let selector: PathSelector = selector.parse().unwrap();
    let reader = ChunkedReader::new(Cursor::new(bytes.to_vec()), 5);
    RecordDecoder::with_window(reader, selector, Limits::default(), window)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

proptest! {
    #[test]
    fn item_records_match_serde_json(
        values in prop::collection::vec(arb_value(), 0..12),
        pretty in any::<bool>(),
        window in 1usize..64,
    ) {
        let bytes = if pretty {
            serde_json::to_vec_pretty(&values).unwrap()
        } else {
            serde_json::to_vec(&values).unwrap()
        };
        let expected: Vec<Value> = serde_json::from_slice(&bytes).unwrap();
        prop_assert_eq!(decode_all(&bytes, "item", window), expected);
    }

    #[test]
    fn document_selector_yields_whole_value(value in arb_value(), window in 1usize..64) {
        let bytes = serde_json::to_vec(&value).unwrap();
        let expected: Value = serde_json::from_slice(&bytes).unwrap();
        prop_assert_eq!(decode_all(&bytes, "", window), vec![expected]);
    }

    #[test]
    fn nested_selector_matches_pointer_lookup(
        rows in prop::collection::vec(arb_value(), 0..8),
    ) {
        let doc = serde_json::json!({"meta": {"n": rows.len()}, "data": {"rows": rows}});
        let bytes = serde_json::to_vec(&doc).unwrap();
        let expected: Value = serde_json::from_slice(&bytes).unwrap();
        let expected_rows = expected["data"]["rows"].as_array().unwrap().clone();
        prop_assert_eq!(decode_all(&bytes, "data.rows.item", 16), expected_rows);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let selector = PathSelector::items();
        let mut decoder = RecordDecoder::new(Cursor::new(bytes.clone()), selector);
        let mut ok = Vec::new();
        let mut failed = false;
        for item in decoder.by_ref() {
            match item {
                Ok(value) => ok.push(value),
                Err(err) => {
                    // Offsets always point inside or just past the input.
                    prop_assert!(err.offset().unwrap_or(0) <= bytes.len() as u64);
                    failed = true;
                }
            }
        }
        prop_assert!(decoder.next().is_none());

        if let Ok(Value::Array(expected)) = serde_json::from_slice::<Value>(&bytes) {
            prop_assert!(!failed);
            prop_assert_eq!(ok, expected);
        }
    }
}
