//! Prefix sampling and shape statistics
//!
//! The profiler pulls at most `sample_size` records from the front of a
//! decoded sequence and reduces them to four scalar features:
//!
//! - **depth**: maximum structural nesting over the sample
//! - **container density**: share of sampled records that are arrays
//! - **length variance**: population standard deviation of serialized length
//! - **density per KB**: sampled records per kilobyte of source
//!
//! Every feature has a non-zero default for degenerate inputs (empty sample,
//! unknown source size, identical lengths) so downstream scoring never
//! divides by zero.

use jsl_format::constants::DEFAULT_SAMPLE_SIZE;
use jsl_format::{DecodedValue, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};

/// Aggregate features of one prefix sample
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeStats {
    /// Records actually sampled (never more than the sample size)
    pub sample_len: usize,
    /// Maximum nesting depth over the sample
    pub depth: usize,
    /// Arrays / sample length, 1 when the sample holds no arrays
    pub container_density: f64,
    /// Population standard deviation of serialized record length in bytes
    pub length_variance: f64,
    /// Sample length / source size in KB
    pub density_per_kb: f64,
}

impl ShapeStats {
    /// Statistics of an empty sample
    pub fn empty() -> Self {
        Self {
            sample_len: 0,
            depth: 0,
            container_density: 1.0,
            length_variance: 1.0,
            density_per_kb: 1.0,
        }
    }
}

/// Draws a bounded prefix sample from a record sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleProfiler {
    sample_size: usize,
}

impl Default for SampleProfiler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_SIZE)
    }
}

impl SampleProfiler {
    /// Profiler sampling at most `sample_size` records; 0 samples nothing
    pub fn new(sample_size: usize) -> Self {
        Self { sample_size }
    }

    /// Maximum number of records pulled per sample
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Sample the front of `records` and compute shape statistics.
    ///
    /// Pulls at most `sample_size` items and never polls the sequence again
    /// once it ends. A decode error ends the sample early: the statistics
    /// cover the records seen before it.
    pub fn profile<I>(&self, records: I, source_size: Option<u64>) -> ShapeStats
    where
        I: IntoIterator<Item = Result<DecodedValue>>,
    {
        let mut sample_len = 0usize;
        let mut depth = 0usize;
        let mut arrays = 0usize;
        let mut lengths = Vec::with_capacity(self.sample_size.min(DEFAULT_SAMPLE_SIZE));

        for item in records.into_iter().take(self.sample_size) {
            let value = match item {
                Ok(value) => value,
                Err(err) => {
                    tracing::debug!(error = %err, sampled = sample_len, "sample ended by decode error");
                    break;
                }
            };
            sample_len += 1;
            depth = depth.max(value_depth(&value));
            if value.is_array() {
                arrays += 1;
            }
            lengths.push(serialized_len(&value) as f64);
        }

        if sample_len == 0 {
            return ShapeStats::empty();
        }

        ShapeStats {
            sample_len,
            depth,
            container_density: container_density(arrays, sample_len),
            length_variance: length_variance(&lengths),
            density_per_kb: density_per_kb(sample_len, source_size),
        }
    }
}

/// Structural depth of a value.
///
/// Scalars and empty containers are 0; a non-empty container is one more
/// than its deepest child. Computed iteratively so hostile nesting cannot
/// exhaust the call stack.
pub fn value_depth(value: &Value) -> usize {
    let mut deepest = 0;
    let mut pending: Vec<(&Value, usize)> = vec![(value, 0)];

    while let Some((value, level)) = pending.pop() {
        match value {
            Value::Array(items) if !items.is_empty() => {
                deepest = deepest.max(level + 1);
                pending.extend(items.iter().map(|child| (child, level + 1)));
            }
            Value::Object(map) if !map.is_empty() => {
                deepest = deepest.max(level + 1);
                pending.extend(map.values().map(|child| (child, level + 1)));
            }
            _ => {}
        }
    }

    deepest
}

fn serialized_len(value: &Value) -> u64 {
    let mut counter = ByteCounter(0);
    // Writing to a counter cannot fail and Value always serializes.
    let _ = serde_json::to_writer(&mut counter, value);
    counter.0
}

struct ByteCounter(u64);

impl Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn length_variance(lengths: &[f64]) -> f64 {
    if lengths.is_empty() {
        return 1.0;
    }
    let n = lengths.len() as f64;
    let mean = lengths.iter().sum::<f64>() / n;
    let variance = lengths.iter().map(|len| (len - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev > 0.0 {
        std_dev
    } else {
        1.0
    }
}

/// Fraction of records that are arrays; a sample without any reports 1
fn container_density(arrays: usize, sample_len: usize) -> f64 {
    if arrays == 0 {
        return 1.0;
    }
    arrays as f64 / sample_len as f64
}

fn density_per_kb(sample_len: usize, source_size: Option<u64>) -> f64 {
    match source_size {
        Some(bytes) if bytes > 0 => sample_len as f64 / (bytes as f64 / 1024.0),
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsl_format::{DecodeReason, JslError};
    use proptest::prelude::*;
    use serde_json::json;
    use std::cell::Cell;

    fn ok_values(values: Vec<Value>) -> impl Iterator<Item = Result<DecodedValue>> {
        values.into_iter().map(Ok)
    }

    #[test]
    fn depth_of_scalars_and_empty_containers_is_zero() {
        assert_eq!(value_depth(&json!(1)), 0);
        assert_eq!(value_depth(&json!("x")), 0);
        assert_eq!(value_depth(&json!(null)), 0);
        assert_eq!(value_depth(&json!({})), 0);
        assert_eq!(value_depth(&json!([])), 0);
    }

    #[test]
    fn depth_of_nested_values() {
        assert_eq!(value_depth(&json!({"a": 1, "b": 2})), 1);
        assert_eq!(value_depth(&json!([[]])), 1);
        assert_eq!(value_depth(&json!({"a": {"b": {"c": {}}}})), 3);
        assert_eq!(value_depth(&json!([1, [2, [3, [4]]]])), 4);
    }

    #[test]
    fn uniform_nesting_depth_equals_levels() {
        for levels in 1..20usize {
            let mut value = json!(0);
            for _ in 0..levels {
                value = json!([value]);
            }
            assert_eq!(value_depth(&value), levels);
        }
    }

    #[test]
    fn empty_sample_uses_defaults() {
        let stats = SampleProfiler::default().profile(ok_values(vec![]), Some(4096));
        assert_eq!(stats, ShapeStats::empty());
    }

    #[test]
    fn computes_features() {
        let values = vec![json!([1, 2]), json!({"a": 1}), json!([]), json!("abcd")];
        let stats = SampleProfiler::new(10).profile(ok_values(values), Some(2048));

        assert_eq!(stats.sample_len, 4);
        assert_eq!(stats.depth, 1);
        assert!((stats.container_density - 0.5).abs() < 1e-12);
        // lengths 5, 7, 2, 6 → mean 5, variance (0+4+9+1)/4 = 3.5
        assert!((stats.length_variance - 3.5f64.sqrt()).abs() < 1e-12);
        assert!((stats.density_per_kb - 2.0).abs() < 1e-12);
    }

    #[test]
    fn identical_lengths_default_variance_to_one() {
        let values = vec![json!({"id": 1}), json!({"id": 2})];
        let stats = SampleProfiler::default().profile(ok_values(values), None);
        assert_eq!(stats.length_variance, 1.0);
        assert_eq!(stats.density_per_kb, 1.0);
    }

    #[test]
    fn sample_without_arrays_defaults_density_to_one() {
        let values = vec![json!({"id": 1}), json!({"id": 22}), json!("x")];
        let stats = SampleProfiler::default().profile(ok_values(values), None);
        assert_eq!(stats.sample_len, 3);
        assert_eq!(stats.container_density, 1.0);

        let one_array = vec![json!({"id": 1}), json!([1]), json!(3), json!(4)];
        let stats = SampleProfiler::default().profile(ok_values(one_array), None);
        assert!((stats.container_density - 0.25).abs() < 1e-12);
    }

    #[test]
    fn zero_source_size_defaults_density() {
        let stats = SampleProfiler::default().profile(ok_values(vec![json!(1)]), Some(0));
        assert_eq!(stats.density_per_kb, 1.0);
    }

    #[test]
    fn decode_error_ends_sample() {
        let items = vec![
            Ok(json!([1])),
            Err(JslError::decode(9, DecodeReason::UnexpectedEof)),
            Ok(json!([2])),
        ];
        let stats = SampleProfiler::default().profile(items, None);
        assert_eq!(stats.sample_len, 1);
        assert_eq!(stats.container_density, 1.0);
    }

    proptest! {
        #[test]
        fn never_pulls_more_than_sample_size(sample_size in 0usize..64, available in 0usize..64) {
            let pulled = Cell::new(0usize);
            let records = (0..available).map(|i| {
                pulled.set(pulled.get() + 1);
                Ok(json!({"i": i}))
            });
            let stats = SampleProfiler::new(sample_size).profile(records, None);
            prop_assert_eq!(pulled.get(), sample_size.min(available));
            prop_assert_eq!(stats.sample_len, sample_size.min(available));
        }
    }
}
