//! Failure reporting: every error ends the job with a partial count

use jsl_io::{
    ByteSource, GuardConfig, IngestOptions, IngestOutcome, IngestRequest, IngestionPipeline,
    Limits, NullTelemetry, OutcomeStatus, ResourceGuard,
};
use jsl_test_utils::FailingReader;
use std::io::ErrorKind;
use std::sync::Arc;

fn run(request: IngestRequest) -> IngestOutcome {
    let guard = ResourceGuard::new(Box::new(NullTelemetry), GuardConfig::default()).unwrap();
    IngestionPipeline::new(Arc::new(guard)).run(request)
}

fn run_bytes(bytes: &[u8]) -> IngestOutcome {
    run(IngestRequest::new(ByteSource::bytes(bytes.to_vec())))
}

fn assert_failed(outcome: &IngestOutcome, kind: &str, records: u64) {
    assert_eq!(outcome.status, OutcomeStatus::Failed, "{outcome:?}");
    assert_eq!(outcome.records, records, "{outcome:?}");
    assert_eq!(outcome.error.as_ref().unwrap().kind, kind, "{outcome:?}");
}

#[test]
fn test_truncated_array() {
    let outcome = run_bytes(br#"[{"id":1},{"id":2}"#);
    assert_failed(&outcome, "decode", 2);
    assert_eq!(outcome.error.unwrap().offset, Some(18));
}

#[test]
fn test_bad_escape() {
    assert_failed(&run_bytes(br#"["ok","bad\q"]"#), "decode", 1);
}

#[test]
fn test_bad_number() {
    assert_failed(&run_bytes(b"[1, 2, -]"), "decode", 2);
    assert_failed(&run_bytes(b"[1.e5]"), "decode", 0);
}

#[test]
fn test_trailing_garbage_after_document() {
    let outcome = run_bytes(b"[1,2] x");
    assert_failed(&outcome, "decode", 2);
    assert_eq!(outcome.error.unwrap().offset, Some(6));
}

#[test]
fn test_depth_limit() {
    let options = IngestOptions {
        limits: Limits {
            max_depth: 4,
            ..Limits::default()
        },
        ..IngestOptions::default()
    };
    let request = IngestRequest::new(ByteSource::bytes(b"[[1],[[[[2]]]]]".to_vec()))
        .with_options(options);
    assert_failed(&run(request), "limit", 1);
}

#[test]
fn test_io_failure_mid_stream() {
    let reader = FailingReader::new(b"[1,2,3,".to_vec(), ErrorKind::ConnectionReset);
    assert_failed(&run(IngestRequest::new(ByteSource::reader(reader))), "io", 3);
}

#[test]
fn test_missing_file() {
    let outcome = run(IngestRequest::new(ByteSource::path("/nonexistent/input.json")));
    assert_failed(&outcome, "source_unavailable", 0);
    assert_eq!(outcome.error.unwrap().offset, None);
}

#[test]
fn test_invalid_options() {
    let mut options = IngestOptions::default();
    options.policy.weights.depth = -1.0;
    let request = IngestRequest::new(ByteSource::bytes(b"[1]".to_vec())).with_options(options);
    assert_failed(&run(request), "config", 0);

    let options = IngestOptions {
        limits: Limits {
            max_depth: 0,
            ..Limits::default()
        },
        ..IngestOptions::default()
    };
    let request = IngestRequest::new(ByteSource::bytes(b"[1]".to_vec())).with_options(options);
    assert_failed(&run(request), "config", 0);
}

#[test]
fn test_empty_input() {
    let outcome = run_bytes(b"   ");
    assert_failed(&outcome, "decode", 0);
    assert_eq!(outcome.structure, jsl_io::Structure::Unknown);
}
