//! JSL Codec - Incremental decoding engine
//!
//! This crate turns raw JSON bytes into records without ever holding the
//! whole document:
//!
//! - Structure sniffing from the first significant byte
//! - Pull-based record decoding with an explicit parser stack
//! - Decoder metrics for verifying the constant-memory bound

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod decoder;
pub mod sniff;

// Re-export commonly used types
pub use jsl_format::{
    DecodeReason, DecodedValue, JslError, Limits, PathSelector, Result, Segment, Structure,
};

// Re-export our own types
pub use decoder::{DecoderMetrics, RecordDecoder};
pub use sniff::sniff;
