//! Shared enumerations

use serde::Serialize;
use std::fmt;

/// Top-level shape of a JSON byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Structure {
    /// First non-whitespace byte is `[`
    Array,
    /// First non-whitespace byte is `{`
    Object,
    /// Empty input, read failure, or any other first byte
    Unknown,
}

impl Structure {
    /// Classify a first non-whitespace byte
    pub fn from_first_byte(byte: u8) -> Self {
        match byte {
            b'[' => Structure::Array,
            b'{' => Structure::Object,
            _ => Structure::Unknown,
        }
    }

    /// Lowercase name used in logs and outcomes
    pub fn as_str(&self) -> &'static str {
        match self {
            Structure::Array => "array",
            Structure::Object => "object",
            Structure::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an ingestion job may use the guarded compute resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// The guard admitted the job onto the resource
    Accelerated,
    /// The guard denied admission, or no resource exists
    Standard,
}

impl ExecutionMode {
    /// Map an admission decision to a mode
    pub fn from_admission(admitted: bool) -> Self {
        if admitted {
            ExecutionMode::Accelerated
        } else {
            ExecutionMode::Standard
        }
    }

    /// Lowercase name used in logs and outcomes
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Accelerated => "accelerated",
            ExecutionMode::Standard => "standard",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON whitespace per RFC 8259
pub fn is_json_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}
