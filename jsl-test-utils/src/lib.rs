//! JSL Test Utilities
//!
//! Shared helpers for JSL tests and benchmarks: record builders, fixture
//! documents and lazily generated JSON streams that never materialise the
//! whole document in memory.

use serde_json::{Map, Value};
use std::io::{self, Read};

pub mod readers;

pub use readers::{ChunkedReader, FailingReader};

/// Builder for creating test records; keys keep insertion order
pub struct RecordBuilder {
    fields: Map<String, Value>,
}

impl RecordBuilder {
    /// Create a new record builder
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Add a field with a string value
    pub fn string(mut self, key: &str, value: &str) -> Self {
        self.fields
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// Add a field with an integer value
    pub fn int(mut self, key: &str, value: i64) -> Self {
        self.fields.insert(key.to_string(), Value::from(value));
        self
    }

    /// Add a field with a float value
    pub fn float(mut self, key: &str, value: f64) -> Self {
        self.fields.insert(key.to_string(), Value::from(value));
        self
    }

    /// Add a field with a boolean value
    pub fn bool(mut self, key: &str, value: bool) -> Self {
        self.fields.insert(key.to_string(), Value::Bool(value));
        self
    }

    /// Add a field with an arbitrary value
    pub fn value(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Build the record
    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape of the records produced by [`ArrayStream`] and [`record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// Flat log lines; every record has depth 1 and a similar length
    Log,
    /// `{"id":i,"payload":...}` where payload is `levels` objects wrapped
    /// around `{"value":i}`; record depth is `levels + 2`
    Nested {
        /// Extra object levels around the innermost payload
        levels: usize,
    },
    /// Records carrying a tag array whose length cycles 0..=4, so lengths vary
    Tagged,
}

/// Build record number `index` of the given shape
pub fn record(shape: RecordShape, index: u64) -> Value {
    let id = index as i64;
    match shape {
        RecordShape::Log => {
            let level = match index % 4 {
                0 => "DEBUG",
                1 => "INFO",
                2 => "WARN",
                _ => "ERROR",
            };
            RecordBuilder::new()
                .int("id", id)
                .int("timestamp", 1_609_459_200 + id)
                .string("level", level)
                .string("user", &format!("user_{}", index % 100))
                .string("message", &format!("Test message number {}", index))
                .build()
        }
        RecordShape::Nested { levels } => {
            let mut payload = RecordBuilder::new().int("value", id).build();
            for level in (0..levels).rev() {
                payload = RecordBuilder::new()
                    .value(&format!("level_{}", level), payload)
                    .build();
            }
            RecordBuilder::new()
                .int("id", id)
                .value("payload", payload)
                .build()
        }
        RecordShape::Tagged => {
            let tags = (0..index % 5)
                .map(|t| Value::String(format!("tag{}", t)))
                .collect();
            RecordBuilder::new()
                .int("id", id)
                .value("tags", Value::Array(tags))
                .float("score", index as f64 / 8.0)
                .build()
        }
    }
}

/// Serialize records as a single JSON array document
pub fn array_document(records: &[Value]) -> Vec<u8> {
    serde_json::to_vec(records).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Open,
    Records,
    Close,
    Done,
}

/// Lazily generated JSON array of `count` records
///
/// Bytes are produced on demand, one record at a time, so a stream of a
/// million records costs no more memory than a stream of ten. Use
/// [`ArrayStream::wrapped_in`] to nest the array under object keys.
pub struct ArrayStream {
    count: u64,
    next: u64,
    shape: RecordShape,
    envelope: Vec<String>,
    stage: Stage,
    pending: Vec<u8>,
    pos: usize,
    emitted: u64,
}

impl ArrayStream {
    /// Root-level array of `count` records
    pub fn new(count: u64, shape: RecordShape) -> Self {
        Self {
            count,
            next: 0,
            shape,
            envelope: Vec::new(),
            stage: Stage::Open,
            pending: Vec::new(),
            pos: 0,
            emitted: 0,
        }
    }

    /// Nest the array under the given object keys, outermost first
    pub fn wrapped_in(mut self, keys: &[&str]) -> Self {
        self.envelope = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Bytes handed out so far
    pub fn bytes_emitted(&self) -> u64 {
        self.emitted
    }

    fn refill(&mut self) {
        self.pending.clear();
        self.pos = 0;
        match self.stage {
            Stage::Open => {
                for key in &self.envelope {
                    self.pending.push(b'{');
                    // Keys are plain test identifiers; serde_json escapes them anyway.
                    let _ = serde_json::to_writer(&mut self.pending, key);
                    self.pending.push(b':');
                }
                self.pending.push(b'[');
                self.stage = Stage::Records;
            }
            Stage::Records => {
                if self.next == self.count {
                    self.stage = Stage::Close;
                    return self.refill();
                }
                if self.next > 0 {
                    self.pending.push(b',');
                }
                let value = record(self.shape, self.next);
                let _ = serde_json::to_writer(&mut self.pending, &value);
                self.next += 1;
            }
            Stage::Close => {
                self.pending.push(b']');
                self.pending
                    .extend(std::iter::repeat(b'}').take(self.envelope.len()));
                self.stage = Stage::Done;
            }
            Stage::Done => {}
        }
    }
}

impl Read for ArrayStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.pending.len() {
            if self.stage == Stage::Done {
                return Ok(0);
            }
            self.refill();
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        self.emitted += n as u64;
        Ok(n)
    }
}

/// Fixture record sets covering decoder edge cases
pub struct TestDataGenerator;

impl TestDataGenerator {
    /// Records with non-ASCII strings and escapes
    pub fn unicode_edge_records() -> Vec<Value> {
        vec![
            RecordBuilder::new().int("id", 1).string("text", "Hello, World!").build(),
            RecordBuilder::new().int("id", 2).string("text", "Hello, 世界! 🌍").build(),
            RecordBuilder::new().int("id", 3).string("text", "tab\tquote\"slash\\").build(),
            RecordBuilder::new().int("id", 4).string("text", "ASCII + 中文 + العربية").build(),
        ]
    }

    /// Records with boundary numbers and empty containers
    pub fn boundary_value_records() -> Vec<Value> {
        vec![
            RecordBuilder::new().int("value", i64::MAX).build(),
            RecordBuilder::new().int("value", i64::MIN).build(),
            RecordBuilder::new().value("value", Value::from(u64::MAX)).build(),
            RecordBuilder::new().float("value", -0.5e-300).build(),
            RecordBuilder::new().string("value", "").build(),
            RecordBuilder::new().value("value", Value::Array(vec![])).build(),
            RecordBuilder::new().value("value", Value::Object(Map::new())).build(),
        ]
    }

    /// A single record nested `levels` objects deep under `nested`
    pub fn deeply_nested_record(levels: usize) -> Value {
        record(RecordShape::Nested { levels }, 0)
    }
}

/// Utility functions for test assertions
pub mod assertions {
    use serde_json::Value;

    /// Assert that two JSON values are equal, printing both on failure
    pub fn assert_json_equal(actual: &Value, expected: &Value, context: &str) {
        if actual != expected {
            panic!(
                "JSON assertion failed in {}:\nExpected: {}\nActual: {}",
                context, expected, actual
            );
        }
    }
}
