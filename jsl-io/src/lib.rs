//! JSL I/O - Sources, sampling, admission and ingestion
//!
//! This crate drives the codec against real inputs:
//!
//! - Multi-pass byte sources (files, plain readers, transparent zstd)
//! - Prefix sampling and shape statistics
//! - Granularity estimation
//! - Resource admission guard with hysteresis
//! - Ingestion pipeline and concurrent batches

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod granularity;
pub mod guard;
pub mod pipeline;
pub mod profile;
mod runtime;
pub mod source;

// Re-export commonly used types
pub use jsl_codec::{sniff, DecoderMetrics, RecordDecoder};
pub use jsl_format::{
    DecodedValue, ExecutionMode, JslError, Limits, PathSelector, Result, Structure,
};

// Re-export our own types
pub use batch::{plan_batch, BatchConfig, BatchDecision};
pub use granularity::{ComplexityWeights, GranularityEstimate, GranularityPolicy};
#[cfg(not(target_arch = "wasm32"))]
pub use guard::SystemMemoryTelemetry;
pub use guard::{
    DeviceReport, GuardConfig, GuardState, NullTelemetry, ResourceGuard, ResourceTelemetry,
    TelemetryError,
};
pub use pipeline::{
    CancelFlag, GranularitySource, IngestOptions, IngestOutcome, IngestRequest,
    IngestionPipeline, OutcomeError, OutcomeStatus,
};
pub use profile::{value_depth, SampleProfiler, ShapeStats};
pub use source::{ByteSource, OpenedSource};

/// Sniff, sample and estimate without running a full ingestion.
///
/// Uses `selector` when given, otherwise the same default the pipeline
/// picks from the sniffed structure.
pub fn profile_source(
    source: ByteSource,
    selector: Option<PathSelector>,
    options: &IngestOptions,
) -> Result<(Structure, PathSelector, GranularityEstimate)> {
    options.validate()?;
    let mut opened = source.open(&options.limits)?;
    let structure = sniff(&mut opened.probe()?);
    let selector = selector.unwrap_or_else(|| default_selector(structure));
    let estimate = pipeline::estimate_granularity(&mut opened, &selector, options)?;
    Ok((structure, selector, estimate))
}

/// Selector used when the caller supplies none: `item` for arrays, the
/// whole document otherwise
pub fn default_selector(structure: Structure) -> PathSelector {
    match structure {
        Structure::Array => PathSelector::items(),
        Structure::Object | Structure::Unknown => PathSelector::document(),
    }
}
