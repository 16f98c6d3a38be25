//! Resource limits and configuration

use crate::error::{JslError, Result};

/// Limits that keep decoding memory bounded on hostile input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum structural nesting depth (default: 1,024, hard: 8,192)
    pub max_depth: usize,
    /// Maximum serialized span of one record (default: 256 MiB, hard: 4 GiB)
    pub max_record_bytes: u64,
    /// Maximum decoded length of one string or key (default: 64 MiB, hard: 1 GiB)
    pub max_string_bytes: usize,
    /// Maximum selector text length (default: 256, hard: 2,048)
    pub max_selector_length: usize,
    /// Maximum selector segments (default: 16, hard: 64)
    pub max_selector_segments: usize,
    /// Maximum bytes recorded for replaying a non-seekable source (default: 64 MiB, hard: 1 GiB)
    pub max_replay_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 1_024,
            max_record_bytes: 256 * 1024 * 1024,
            max_string_bytes: 64 * 1024 * 1024,
            max_selector_length: 256,
            max_selector_segments: 16,
            max_replay_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Hard maximum limits that cannot be exceeded
    pub fn hard_maximums() -> Self {
        Self {
            max_depth: 8_192,
            max_record_bytes: 4 * 1024 * 1024 * 1024,
            max_string_bytes: 1024 * 1024 * 1024,
            max_selector_length: 2_048,
            max_selector_segments: 64,
            max_replay_bytes: 1024 * 1024 * 1024,
        }
    }

    /// Validate limits against hard maximums
    pub fn validate(&self) -> Result<()> {
        let hard = Self::hard_maximums();

        check("max_depth", self.max_depth as u64, hard.max_depth as u64)?;
        check("max_record_bytes", self.max_record_bytes, hard.max_record_bytes)?;
        check(
            "max_string_bytes",
            self.max_string_bytes as u64,
            hard.max_string_bytes as u64,
        )?;
        check(
            "max_selector_length",
            self.max_selector_length as u64,
            hard.max_selector_length as u64,
        )?;
        check(
            "max_selector_segments",
            self.max_selector_segments as u64,
            hard.max_selector_segments as u64,
        )?;
        check(
            "max_replay_bytes",
            self.max_replay_bytes as u64,
            hard.max_replay_bytes as u64,
        )?;

        Ok(())
    }
}

fn check(name: &str, value: u64, hard: u64) -> Result<()> {
    if value == 0 {
        return Err(JslError::InvalidConfig(format!("{name} must be positive")));
    }
    if value > hard {
        return Err(JslError::InvalidConfig(format!(
            "{name} {value} exceeds hard limit {hard}"
        )));
    }
    Ok(())
}
