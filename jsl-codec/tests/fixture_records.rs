//! Hand-picked edge records decoded through small reads

use jsl_codec::{PathSelector, RecordDecoder};
use jsl_test_utils::assertions::assert_json_equal;
use jsl_test_utils::{array_document, ChunkedReader, TestDataGenerator};
use serde_json::Value;
use std::io::Cursor;

fn decode_items(records: &[Value]) -> Vec<Value> {
    let bytes = array_document(records);
    // 3-byte reads split multi-byte characters and escapes across refills
    let reader = ChunkedReader::new(Cursor::new(bytes), 3);
    RecordDecoder::new(reader, PathSelector::items())
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn assert_all_equal(actual: &[Value], expected: &[Value], context: &str) {
    assert_eq!(actual.len(), expected.len(), "{context}: record count");
    for (index, (got, want)) in actual.iter().zip(expected).enumerate() {
        assert_json_equal(got, want, &format!("{context} record {index}"));
    }
}

#[test]
fn unicode_records_survive_split_reads() {
    let expected = TestDataGenerator::unicode_edge_records();
    let decoded = decode_items(&expected);
    assert_all_equal(&decoded, &expected, "unicode");
}

#[test]
fn boundary_values_decode_exactly() {
    let expected = TestDataGenerator::boundary_value_records();
    let decoded = decode_items(&expected);
    assert_all_equal(&decoded, &expected, "boundary");
    assert_eq!(decoded[2]["value"].as_u64(), Some(u64::MAX));
    assert_eq!(decoded[1]["value"].as_i64(), Some(i64::MIN));
}

#[test]
fn deeply_nested_document_is_one_record() {
    let expected = TestDataGenerator::deeply_nested_record(40);
    let bytes = serde_json::to_vec(&expected).unwrap();
    let mut decoder = RecordDecoder::new(Cursor::new(bytes), PathSelector::document());
    let record = decoder.next().unwrap().unwrap();
    assert_json_equal(&record, &expected, "nested document");
    assert!(decoder.next().is_none());
    assert_eq!(decoder.metrics().peak_depth, 42);
}
