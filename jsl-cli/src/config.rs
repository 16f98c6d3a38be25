//! Optional TOML configuration file
//!
//! ```toml
//! [guard]
//! enabled = true
//! device = 0
//! upper_threshold = 75.0
//! hysteresis_gap = 15.0
//!
//! [ingest]
//! sample_size = 500
//! progress_interval = 50000
//! max_depth = 512
//!
//! [ingest.policy]
//! numerator = 20000.0
//! ```
//!
//! Command-line flags override values read from the file.

use jsl_io::{GranularityPolicy, GuardConfig, IngestOptions, Limits};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub guard: GuardSection,
    pub ingest: IngestSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GuardSection {
    pub enabled: bool,
    pub device: usize,
    pub upper_threshold: Option<f64>,
    pub hysteresis_gap: Option<f64>,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            enabled: true,
            device: 0,
            upper_threshold: None,
            hysteresis_gap: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub sample_size: Option<usize>,
    pub progress_interval: Option<u64>,
    pub measure_rss: Option<bool>,
    pub max_depth: Option<usize>,
    pub max_record_bytes: Option<u64>,
    pub max_string_bytes: Option<usize>,
    pub max_replay_bytes: Option<usize>,
    pub policy: Option<GranularityPolicy>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` when given, defaults otherwise
    pub fn load_optional(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Guard thresholds: flag, then file, then built-in default
    pub fn guard_config(&self, threshold: Option<f64>, gap: Option<f64>) -> GuardConfig {
        let defaults = GuardConfig::default();
        GuardConfig {
            upper_threshold: threshold
                .or(self.guard.upper_threshold)
                .unwrap_or(defaults.upper_threshold),
            hysteresis_gap: gap
                .or(self.guard.hysteresis_gap)
                .unwrap_or(defaults.hysteresis_gap),
        }
    }

    pub fn ingest_options(&self, sample_size: Option<usize>, measure_rss: bool) -> IngestOptions {
        let section = &self.ingest;
        let defaults = IngestOptions::default();
        let default_limits = Limits::default();
        IngestOptions {
            sample_size: sample_size
                .or(section.sample_size)
                .unwrap_or(defaults.sample_size),
            limits: Limits {
                max_depth: section.max_depth.unwrap_or(default_limits.max_depth),
                max_record_bytes: section
                    .max_record_bytes
                    .unwrap_or(default_limits.max_record_bytes),
                max_string_bytes: section
                    .max_string_bytes
                    .unwrap_or(default_limits.max_string_bytes),
                max_replay_bytes: section
                    .max_replay_bytes
                    .unwrap_or(default_limits.max_replay_bytes),
                ..default_limits
            },
            policy: section.policy.unwrap_or(defaults.policy),
            progress_interval: section
                .progress_interval
                .unwrap_or(defaults.progress_interval),
            measure_rss: measure_rss || section.measure_rss.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.guard.enabled);
        assert_eq!(config.guard_config(None, None), GuardConfig::default());
        assert_eq!(config.ingest_options(None, false), IngestOptions::default());
    }

    #[test]
    fn file_values_and_flag_overrides() {
        let config: FileConfig = toml::from_str(
            r#"
            [guard]
            enabled = false
            upper_threshold = 70.0
            hysteresis_gap = 10.0

            [ingest]
            sample_size = 50
            max_depth = 64

            [ingest.policy.weights]
            depth = 0.5
            "#,
        )
        .unwrap();

        assert!(!config.guard.enabled);
        let guard = config.guard_config(Some(90.0), None);
        assert_eq!(guard.upper_threshold, 90.0);
        assert_eq!(guard.hysteresis_gap, 10.0);

        let options = config.ingest_options(Some(7), true);
        assert_eq!(options.sample_size, 7);
        assert_eq!(options.limits.max_depth, 64);
        assert_eq!(options.policy.weights.depth, 0.5);
        assert_eq!(options.policy.weights.container_density, 0.4);
        assert!(options.measure_rss);
    }

    #[test]
    fn load_reports_path_on_errors() {
        let err = FileConfig::load(Path::new("/no/such/jsl.toml")).unwrap_err();
        assert!(err.to_string().contains("/no/such/jsl.toml"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[guard\n").unwrap();
        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
