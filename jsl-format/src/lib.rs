//! JSL Format - Core primitives for JSON Stream Lite
//!
//! This crate provides the vocabulary shared by every JSL crate, with no I/O
//! dependencies:
//!
//! - Error types
//! - Decoding limits
//! - Constants (sample size, granularity bounds, guard thresholds)
//! - Path selectors
//! - Structure and execution-mode enumerations

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod limits;
pub mod selector;
pub mod types;

// Re-export commonly used types
pub use error::{DecodeReason, JslError, Result};
pub use limits::Limits;
pub use selector::{PathSelector, Segment};
pub use types::{is_json_whitespace, ExecutionMode, Structure};

/// One decoded record; transient, dropped after each pull
pub type DecodedValue = serde_json::Value;
