//! Constants shared across JSL crates

/// Default number of leading records drawn for shape profiling.
pub const DEFAULT_SAMPLE_SIZE: usize = 1_000;

/// Smallest granularity recommendation, in KB.
pub const MIN_GRANULARITY_KB: u32 = 1_000;
/// Largest granularity recommendation, in KB.
pub const MAX_GRANULARITY_KB: u32 = 10_000;
/// Numerator divided by the complexity score to obtain a recommendation.
pub const GRANULARITY_NUMERATOR: f64 = 20_000.0;
/// Floor applied to the complexity score before division.
pub const SCORE_EPSILON: f64 = 1e-9;

/// Weight of maximum structural depth in the complexity score.
pub const WEIGHT_DEPTH: f64 = 0.3;
/// Weight of container density in the complexity score.
pub const WEIGHT_CONTAINER_DENSITY: f64 = 0.4;
/// Weight of serialized-length standard deviation in the complexity score.
pub const WEIGHT_LENGTH_VARIANCE: f64 = 0.2;
/// Weight of records-per-kilobyte in the complexity score.
pub const WEIGHT_DENSITY_PER_KB: f64 = 0.1;

/// Utilization percentage at which the resource guard stops admitting.
pub const DEFAULT_UPPER_THRESHOLD: f64 = 80.0;
/// Distance below the upper threshold required before re-admitting.
pub const DEFAULT_HYSTERESIS_GAP: f64 = 20.0;
/// Utilization reported when a telemetry query fails.
pub const FAIL_SAFE_UTILIZATION: f64 = 100.0;

/// Bytes requested from the source per read.
pub const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Log a progress line every this many records.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Zstandard frame magic, little endian on the wire.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Selector segment meaning "every element of the array at this level".
pub const ITEM_SEGMENT: &str = "item";
