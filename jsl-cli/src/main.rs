//! JSL CLI - Command-line tool for JSON Stream Lite
//!
//! This binary provides command-line interfaces for:
//! - ingest: stream every selected record of a document under the guard
//! - sniff: report the top-level structure of a document
//! - profile: sample a document and print its granularity estimate
//! - guard: show current device utilization and admission decisions

mod config;

use clap::{Args, Parser, Subcommand, ValueEnum};
use config::FileConfig;
use indicatif::{ProgressBar, ProgressStyle};
use jsl_io::{
    profile_source, sniff, ByteSource, DeviceReport, GranularityEstimate, GranularitySource,
    IngestOutcome, IngestRequest, IngestionPipeline, Limits, PathSelector, ResourceGuard,
    ShapeStats, Structure,
};
use serde::Serialize;
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the tracing filter directives
const LOG_ENV: &str = "JSL_LOG";

/// Records between spinner refreshes
const SPINNER_STRIDE: u64 = 1024;

#[derive(Parser)]
#[command(name = "jsl")]
#[command(about = "JSON Stream Lite - constant-memory JSON ingestion")]
#[command(version)]
struct Cli {
    /// Log output format (filter with JSL_LOG, default "info")
    #[arg(long, value_enum, global = true, default_value = "text")]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream every selected record of a JSON document
    Ingest(IngestArgs),
    /// Report whether a document is an array, an object, or unknown
    Sniff {
        /// Input file ("-" for stdin)
        input: PathBuf,
    },
    /// Sample a document and print its shape statistics and chunk estimate
    Profile {
        /// Input file ("-" for stdin)
        input: PathBuf,
        /// Record selector, e.g. "item" or "data.item" (default depends on structure)
        #[arg(long)]
        selector: Option<String>,
        /// Records to sample
        #[arg(long)]
        sample_size: Option<usize>,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show device utilization and whether a job would be admitted
    Guard {
        /// Utilization percentage that disables acceleration
        #[arg(long)]
        threshold: Option<f64>,
        /// Distance below the threshold required to re-enable
        #[arg(long)]
        gap: Option<f64>,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Input file ("-" for stdin)
    input: PathBuf,
    /// Record selector, e.g. "item" or "data.item" (default depends on structure)
    #[arg(long)]
    selector: Option<String>,
    /// Chunk size in KB, skipping estimation
    #[arg(long)]
    chunk_size: Option<u32>,
    /// Utilization percentage that disables acceleration
    #[arg(long)]
    threshold: Option<f64>,
    /// Distance below the threshold required to re-enable
    #[arg(long)]
    gap: Option<f64>,
    /// Device index consulted by the guard
    #[arg(long)]
    device: Option<usize>,
    /// Records sampled for the estimate
    #[arg(long)]
    sample_size: Option<usize>,
    /// Always run in standard mode
    #[arg(long)]
    no_guard: bool,
    /// Sample peak resident memory while ingesting
    #[arg(long)]
    measure_rss: bool,
    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
    /// Show progress spinner while ingesting
    #[arg(long)]
    progress: bool,
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Ingest(args) => {
            handle_ingest(args)?;
        }
        Commands::Sniff { input } => {
            handle_sniff(input)?;
        }
        Commands::Profile {
            input,
            selector,
            sample_size,
            format,
            config,
        } => {
            handle_profile(input, selector, sample_size, format, config)?;
        }
        Commands::Guard {
            threshold,
            gap,
            format,
            config,
        } => {
            handle_guard(threshold, gap, format, config)?;
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(err) = result {
        eprintln!("warning: logging disabled: {}", err);
    }
}

fn handle_ingest(args: IngestArgs) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let file = FileConfig::load_optional(args.config.as_deref())?;
    let options = file.ingest_options(args.sample_size, args.measure_rss);
    options.validate()?;

    let guard = if args.no_guard || !file.guard.enabled {
        ResourceGuard::disabled()
    } else {
        ResourceGuard::detect(file.guard_config(args.threshold, args.gap))?
    };
    let device = args.device.unwrap_or(file.guard.device);
    tracing::debug!(
        input = %args.input.display(),
        backend = guard.backend(),
        device,
        "starting ingest"
    );

    let mut request = IngestRequest::new(input_source(&args.input))
        .on_device(device)
        .with_options(options.clone());
    if let Some(text) = args.selector.as_deref() {
        request = request.with_selector(PathSelector::parse(text, &options.limits)?);
    }
    if let Some(kb) = args.chunk_size {
        request = request.with_granularity(kb);
    }

    let pipeline = IngestionPipeline::new(Arc::new(guard));
    let mut progress_bar = args.progress.then(|| create_spinner("Ingesting records"));
    let mut seen = 0u64;
    let outcome = pipeline.run_with(request, |_, _| {
        seen += 1;
        if seen % SPINNER_STRIDE == 0 {
            if let Some(pb) = progress_bar.as_ref() {
                pb.set_position(seen);
            }
        }
    });
    let elapsed = start.elapsed();
    let rec_rate = outcome.records as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    if let Some(pb) = progress_bar.take() {
        pb.set_position(outcome.records);
        pb.finish_with_message(format!(
            "Ingested {} records in {:.2?} ({:.1} rec/s, {})",
            outcome.records, elapsed, rec_rate, outcome.status
        ));
    }

    let mut stdout = std::io::stdout().lock();
    match args.format {
        OutputFormat::Text => write_outcome_text(&mut stdout, &outcome)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut stdout, &outcome)?;
            writeln!(&mut stdout)?;
        }
    }
    report_ingest_summary(&args.input, &outcome, elapsed, rec_rate)?;

    if outcome.is_success() {
        return Ok(());
    }
    let message = outcome
        .error
        .map(|error| error.message)
        .unwrap_or_default();
    Err(format!("ingestion {}: {}", outcome.status, message).into())
}

fn handle_sniff(input: PathBuf) -> Result<(), Box<dyn Error>> {
    let mut opened = input_source(&input).open(&Limits::default())?;
    let structure = sniff(&mut opened.probe()?);
    let mut stdout = std::io::stdout().lock();
    writeln!(&mut stdout, "{}", structure)?;
    Ok(())
}

fn handle_profile(
    input: PathBuf,
    selector: Option<String>,
    sample_size: Option<usize>,
    format: OutputFormat,
    config: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let file = FileConfig::load_optional(config.as_deref())?;
    let options = file.ingest_options(sample_size, false);
    options.validate()?;
    let selector = selector
        .as_deref()
        .map(|text| PathSelector::parse(text, &options.limits))
        .transpose()?;

    let (structure, selector, estimate) =
        profile_source(input_source(&input), selector, &options)?;
    let report = ProfileReport::new(structure, &selector, estimate);

    let mut stdout = std::io::stdout().lock();
    match format {
        OutputFormat::Text => write_profile_text(&mut stdout, &report)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut stdout, &report)?;
            writeln!(&mut stdout)?;
        }
    }
    Ok(())
}

fn handle_guard(
    threshold: Option<f64>,
    gap: Option<f64>,
    format: OutputFormat,
    config: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let file = FileConfig::load_optional(config.as_deref())?;
    let guard = ResourceGuard::detect(file.guard_config(threshold, gap))?;
    let admitted: Vec<bool> = (0..guard.device_count())
        .map(|device| guard.admit(device))
        .collect();
    let report = GuardReport {
        backend: guard.backend().to_string(),
        upper_threshold: guard.config().upper_threshold,
        lower_threshold: guard.config().lower_threshold(),
        devices: guard
            .report()
            .into_iter()
            .zip(admitted)
            .map(|(report, admitted)| DeviceSummary { report, admitted })
            .collect(),
    };

    let mut stdout = std::io::stdout().lock();
    match format {
        OutputFormat::Text => write_guard_text(&mut stdout, &report)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut stdout, &report)?;
            writeln!(&mut stdout)?;
        }
    }
    Ok(())
}

fn input_source(input: &Path) -> ByteSource {
    if input.as_os_str() == "-" {
        ByteSource::reader(std::io::stdin())
    } else {
        ByteSource::path(input)
    }
}

fn display_selector(selector: &str) -> &str {
    if selector.is_empty() {
        "<document>"
    } else {
        selector
    }
}

fn write_outcome_text<W: Write>(out: &mut W, outcome: &IngestOutcome) -> std::io::Result<()> {
    writeln!(out, "status: {}", outcome.status)?;
    writeln!(out, "records: {}", outcome.records)?;
    writeln!(out, "mode: {}", outcome.mode)?;
    writeln!(out, "elapsed: {} ms", outcome.elapsed_millis)?;
    writeln!(out, "structure: {}", outcome.structure)?;
    writeln!(out, "selector: {}", display_selector(&outcome.selector))?;
    if let Some(kb) = outcome.granularity_kb {
        match (outcome.granularity_source, outcome.complexity_score) {
            (Some(GranularitySource::Estimated), Some(score)) => writeln!(
                out,
                "granularity: {} KB (estimated from {} records, score {:.3})",
                kb, outcome.sampled_records, score
            )?,
            _ => writeln!(out, "granularity: {} KB (override)", kb)?,
        }
    }
    writeln!(out, "bytes consumed: {}", outcome.bytes_consumed)?;
    writeln!(out, "peak buffer: {} bytes", outcome.peak_buffer_bytes)?;
    if let Some(rss) = outcome.peak_rss_bytes {
        writeln!(out, "peak rss: {:.1} MiB", rss as f64 / (1024.0 * 1024.0))?;
    }
    if let Some(error) = &outcome.error {
        match error.offset {
            Some(offset) => writeln!(
                out,
                "error: {} at byte {}: {}",
                error.kind, offset, error.message
            )?,
            None => writeln!(out, "error: {}: {}", error.kind, error.message)?,
        }
    }
    Ok(())
}

fn report_ingest_summary(
    input: &Path,
    outcome: &IngestOutcome,
    elapsed: Duration,
    rec_rate: f64,
) -> Result<(), Box<dyn Error>> {
    let mut stderr = std::io::stderr().lock();
    writeln!(
        &mut stderr,
        "Ingested {} (records: {}, mode: {}, status: {}, elapsed: {:.2?}, {:.1} rec/s)",
        input.display(),
        outcome.records,
        outcome.mode,
        outcome.status,
        elapsed,
        rec_rate
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileReport {
    structure: Structure,
    selector: String,
    recommendation_kb: u32,
    score: f64,
    stats: ShapeStats,
}

impl ProfileReport {
    fn new(structure: Structure, selector: &PathSelector, estimate: GranularityEstimate) -> Self {
        Self {
            structure,
            selector: selector.as_str().to_string(),
            recommendation_kb: estimate.recommendation_kb,
            score: estimate.score,
            stats: estimate.stats,
        }
    }
}

fn write_profile_text<W: Write>(out: &mut W, report: &ProfileReport) -> std::io::Result<()> {
    let stats = &report.stats;
    writeln!(out, "structure: {}", report.structure)?;
    writeln!(out, "selector: {}", display_selector(&report.selector))?;
    writeln!(out, "sampled records: {}", stats.sample_len)?;
    writeln!(out, "depth: {}", stats.depth)?;
    writeln!(out, "container density: {:.3}", stats.container_density)?;
    writeln!(out, "length std-dev: {:.3}", stats.length_variance)?;
    writeln!(out, "records per KB: {:.3}", stats.density_per_kb)?;
    writeln!(out, "complexity score: {:.3}", report.score)?;
    writeln!(out, "recommended granularity: {} KB", report.recommendation_kb)?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GuardReport {
    backend: String,
    upper_threshold: f64,
    lower_threshold: f64,
    devices: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, Serialize)]
struct DeviceSummary {
    #[serde(flatten)]
    report: DeviceReport,
    admitted: bool,
}

fn write_guard_text<W: Write>(out: &mut W, report: &GuardReport) -> std::io::Result<()> {
    writeln!(
        out,
        "backend: {} (disable at {:.1}%, re-enable below {:.1}%)",
        report.backend, report.upper_threshold, report.lower_threshold
    )?;
    if report.devices.is_empty() {
        writeln!(out, "no devices visible; jobs run in standard mode")?;
    }
    for device in &report.devices {
        writeln!(
            out,
            "device {}: {:.1}% {} ({})",
            device.report.device,
            device.report.utilization,
            device.report.state,
            if device.admitted {
                "accelerated"
            } else {
                "standard"
            }
        )?;
    }
    Ok(())
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
