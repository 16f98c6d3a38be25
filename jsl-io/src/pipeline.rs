//! Ingestion orchestration
//!
//! One job runs as a single-threaded pull:
//!
//! 1. open the source and sniff its top-level structure
//! 2. pick a selector (`item` for arrays, the whole document otherwise)
//!    unless the caller supplied one
//! 3. without a granularity override, sample the prefix and estimate one
//! 4. ask the shared [`ResourceGuard`] for the execution mode
//! 5. decode from offset 0, counting records, until the end, an error or
//!    cancellation
//!
//! Failures never escape as `Err`: they are reported in the
//! [`IngestOutcome`] together with the partial record count.

use crate::batch::{plan_batch, BatchConfig};
use crate::granularity::{GranularityEstimate, GranularityPolicy};
use crate::guard::ResourceGuard;
use crate::profile::SampleProfiler;
use crate::runtime::RuntimeMeasurement;
use crate::source::{ByteSource, OpenedSource};
use jsl_codec::{sniff, DecoderMetrics, RecordDecoder};
use jsl_format::constants::{DEFAULT_PROGRESS_INTERVAL, DEFAULT_SAMPLE_SIZE};
use jsl_format::{
    DecodedValue, ExecutionMode, JslError, Limits, PathSelector, Result, Structure,
};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation switch; clones observe the same flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Fresh, un-cancelled flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every job holding this flag to stop before its next pull
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [`CancelFlag::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Tunables for one ingestion job
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    /// Records drawn for granularity estimation
    pub sample_size: usize,
    /// Decoder and source limits
    pub limits: Limits,
    /// Scoring policy for the estimate
    pub policy: GranularityPolicy,
    /// Log progress every this many records; 0 disables progress logs
    pub progress_interval: u64,
    /// Sample peak process RSS while the job runs
    pub measure_rss: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            limits: Limits::default(),
            policy: GranularityPolicy::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            measure_rss: false,
        }
    }
}

impl IngestOptions {
    /// Validate limits and policy
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.policy.validate()
    }
}

/// One ingestion job
#[derive(Debug)]
pub struct IngestRequest {
    /// Where the bytes come from
    pub source: ByteSource,
    /// Explicit selector; chosen from the sniffed structure when `None`
    pub selector: Option<PathSelector>,
    /// Caller-chosen granularity in KB; skips sampling when set
    pub granularity_override_kb: Option<u32>,
    /// Guarded device the job asks admission for
    pub device: usize,
    /// Tunables
    pub options: IngestOptions,
    /// Cancellation switch checked before every pull
    pub cancel: Option<CancelFlag>,
}

impl IngestRequest {
    /// Request with defaults for everything but the source
    pub fn new(source: ByteSource) -> Self {
        Self {
            source,
            selector: None,
            granularity_override_kb: None,
            device: 0,
            options: IngestOptions::default(),
            cancel: None,
        }
    }

    /// Use an explicit selector
    pub fn with_selector(mut self, selector: PathSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Skip estimation and use this granularity
    pub fn with_granularity(mut self, kb: u32) -> Self {
        self.granularity_override_kb = Some(kb);
        self
    }

    /// Ask admission for another device
    pub fn on_device(mut self, device: usize) -> Self {
        self.device = device;
        self
    }

    /// Replace the tunables
    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach a cancellation flag
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Terminal status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The decoder reached the end of the selected records
    Completed,
    /// Decoding or source access failed
    Failed,
    /// The cancel flag was raised
    Cancelled,
}

impl OutcomeStatus {
    /// Lowercase name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Completed => "completed",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the reported granularity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GranularitySource {
    /// Computed from a prefix sample
    Estimated,
    /// Supplied by the caller
    Override,
}

/// Error summary carried by a failed or cancelled outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeError {
    /// Stable error kind, e.g. `decode` or `source_unavailable`
    pub kind: String,
    /// Byte offset in the decoded stream, when known
    pub offset: Option<u64>,
    /// Human-readable message
    pub message: String,
}

impl From<&JslError> for OutcomeError {
    fn from(err: &JslError) -> Self {
        Self {
            kind: err.kind().to_string(),
            offset: err.offset(),
            message: err.to_string(),
        }
    }
}

/// Result of one ingestion job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    /// Records pulled before the job ended (partial on failure)
    pub records: u64,
    /// Wall-clock duration of the whole job
    pub elapsed_millis: u64,
    /// Mode chosen by the guard
    pub mode: ExecutionMode,
    /// Present unless the job completed
    pub error: Option<OutcomeError>,
    /// Terminal status
    pub status: OutcomeStatus,
    /// Sniffed top-level structure
    pub structure: Structure,
    /// Selector the records were decoded with
    pub selector: String,
    /// Advisory chunk size in KB, when the job got that far
    pub granularity_kb: Option<u32>,
    /// Origin of `granularity_kb`
    pub granularity_source: Option<GranularitySource>,
    /// Complexity score behind an estimated granularity
    pub complexity_score: Option<f64>,
    /// Records drawn by the sampling pass
    pub sampled_records: usize,
    /// Bytes consumed by the decoding pass
    pub bytes_consumed: u64,
    /// Upper bound on decoder memory during the decoding pass
    pub peak_buffer_bytes: u64,
    /// Peak process RSS, when measured
    pub peak_rss_bytes: Option<u64>,
}

impl IngestOutcome {
    /// Whether the job ran to completion
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}

/// Per-job state accumulated while the stages run
struct JobReport {
    structure: Structure,
    selector: String,
    mode: ExecutionMode,
    granularity_kb: Option<u32>,
    granularity_source: Option<GranularitySource>,
    complexity_score: Option<f64>,
    sampled_records: usize,
    records: u64,
    metrics: DecoderMetrics,
    status: OutcomeStatus,
    error: Option<OutcomeError>,
}

impl JobReport {
    fn new() -> Self {
        Self {
            structure: Structure::Unknown,
            selector: String::new(),
            mode: ExecutionMode::Standard,
            granularity_kb: None,
            granularity_source: None,
            complexity_score: None,
            sampled_records: 0,
            records: 0,
            metrics: DecoderMetrics::default(),
            status: OutcomeStatus::Completed,
            error: None,
        }
    }

    fn fail(&mut self, err: &JslError) {
        self.status = OutcomeStatus::Failed;
        self.error = Some(OutcomeError::from(err));
    }

    fn cancel(&mut self) {
        self.status = OutcomeStatus::Cancelled;
        self.error = Some(OutcomeError {
            kind: "cancelled".to_string(),
            offset: None,
            message: "job cancelled".to_string(),
        });
    }
}

/// Runs ingestion jobs against one shared resource guard
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    guard: Arc<ResourceGuard>,
}

impl IngestionPipeline {
    /// Pipeline whose jobs all contend on `guard`
    pub fn new(guard: Arc<ResourceGuard>) -> Self {
        Self { guard }
    }

    /// The shared guard
    pub fn guard(&self) -> &Arc<ResourceGuard> {
        &self.guard
    }

    /// Run a job, discarding each record after counting it
    pub fn run(&self, request: IngestRequest) -> IngestOutcome {
        self.run_with(request, |_, _| {})
    }

    /// Run a job, handing every record to `visit` before dropping it
    pub fn run_with<F>(&self, request: IngestRequest, mut visit: F) -> IngestOutcome
    where
        F: FnMut(DecodedValue, ExecutionMode),
    {
        let measurement = RuntimeMeasurement::begin(request.options.measure_rss);
        let mut report = JobReport::new();

        if let Err(err) = self.drive(request, &mut report, &measurement, &mut visit) {
            tracing::warn!(
                error = %err,
                records = report.records,
                "ingestion failed"
            );
            report.fail(&err);
        }

        let runtime = measurement.finish();
        let outcome = IngestOutcome {
            records: report.records,
            elapsed_millis: runtime.wall_time.as_millis() as u64,
            mode: report.mode,
            error: report.error,
            status: report.status,
            structure: report.structure,
            selector: report.selector,
            granularity_kb: report.granularity_kb,
            granularity_source: report.granularity_source,
            complexity_score: report.complexity_score,
            sampled_records: report.sampled_records,
            bytes_consumed: report.metrics.bytes_consumed,
            peak_buffer_bytes: report.metrics.peak_buffer_bytes(),
            peak_rss_bytes: runtime.peak_rss_bytes,
        };

        tracing::info!(
            records = outcome.records,
            elapsed_ms = outcome.elapsed_millis,
            mode = %outcome.mode,
            status = %outcome.status,
            "ingestion finished"
        );
        outcome
    }

    /// Run several jobs concurrently; outcomes come back in request order
    pub fn execute_batch(
        &self,
        requests: Vec<IngestRequest>,
        config: &BatchConfig,
    ) -> Result<Vec<IngestOutcome>> {
        let decision = plan_batch(requests.len(), config);
        tracing::info!(
            jobs = requests.len(),
            threads = decision.thread_count,
            reason = %decision.reason,
            "starting ingestion batch"
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(decision.thread_count)
            .thread_name(|index| format!("jsl-ingest-{}", index))
            .build()
            .map_err(|err| JslError::Internal(format!("failed to build worker pool: {}", err)))?;

        Ok(pool.install(|| {
            requests
                .into_par_iter()
                .map(|request| self.run(request))
                .collect()
        }))
    }

    fn drive<F>(
        &self,
        request: IngestRequest,
        report: &mut JobReport,
        measurement: &RuntimeMeasurement,
        visit: &mut F,
    ) -> Result<()>
    where
        F: FnMut(DecodedValue, ExecutionMode),
    {
        let IngestRequest {
            source,
            selector,
            granularity_override_kb,
            device,
            options,
            cancel,
        } = request;
        let cancelled = || cancel.as_ref().is_some_and(CancelFlag::is_cancelled);

        options.validate()?;
        if granularity_override_kb == Some(0) {
            return Err(JslError::InvalidConfig(
                "granularity override must be positive".to_string(),
            ));
        }

        let description = source.describe();
        let mut opened = source.open(&options.limits)?;

        report.structure = {
            let mut probe = opened.probe()?;
            sniff(&mut probe)
        };
        let selector = selector.unwrap_or_else(|| crate::default_selector(report.structure));
        report.selector = selector.to_string();

        match granularity_override_kb {
            Some(kb) => {
                report.granularity_kb = Some(kb);
                report.granularity_source = Some(GranularitySource::Override);
            }
            None => {
                if cancelled() {
                    report.cancel();
                    return Ok(());
                }
                let estimate = estimate_granularity(&mut opened, &selector, &options)?;
                report.granularity_kb = Some(estimate.recommendation_kb);
                report.granularity_source = Some(GranularitySource::Estimated);
                report.complexity_score = Some(estimate.score);
                report.sampled_records = estimate.stats.sample_len;
            }
        }

        report.mode = ExecutionMode::from_admission(self.guard.admit(device));
        tracing::info!(
            source = %description,
            structure = %report.structure,
            selector = %report.selector,
            granularity_kb = report.granularity_kb,
            mode = %report.mode,
            "ingestion started"
        );

        let reader = opened.into_reader()?;
        let mut decoder = RecordDecoder::with_limits(reader, selector, options.limits.clone())?;
        let mut failure = None;
        loop {
            if cancelled() {
                report.cancel();
                break;
            }
            match decoder.next() {
                None => break,
                Some(Ok(record)) => {
                    visit(record, report.mode);
                    report.records += 1;
                    if options.progress_interval > 0
                        && report.records % options.progress_interval == 0
                    {
                        tracing::info!(
                            records = report.records,
                            usage = self.guard.observe(device),
                            elapsed_ms = measurement.elapsed().as_millis() as u64,
                            "ingestion progress"
                        );
                    }
                }
                Some(Err(err)) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        report.metrics = decoder.metrics();
        drop(decoder);

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Sampling pass over a fresh probe of `opened`
pub(crate) fn estimate_granularity(
    opened: &mut OpenedSource,
    selector: &PathSelector,
    options: &IngestOptions,
) -> Result<GranularityEstimate> {
    let size_hint = opened.size_hint();
    let probe = opened.probe()?;
    let decoder = RecordDecoder::with_limits(probe, selector.clone(), options.limits.clone())?;
    let stats = SampleProfiler::new(options.sample_size).profile(decoder, size_hint);
    let estimate = options.policy.estimate(stats);
    tracing::debug!(
        sampled = estimate.stats.sample_len,
        depth = estimate.stats.depth,
        score = estimate.score,
        granularity_kb = estimate.recommendation_kb,
        "granularity estimated"
    );
    Ok(estimate)
}
