//! Error types for JSL

use thiserror::Error;

/// Why a byte stream failed to decode as JSON
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeReason {
    /// A byte that cannot start or continue the expected token.
    #[error("unexpected byte 0x{0:02x}")]
    UnexpectedByte(u8),
    /// Input ended inside a structure, or before any value was seen.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Backslash escape that JSON does not define.
    #[error("invalid escape sequence")]
    InvalidEscape,
    /// `\u` escape naming an unpaired UTF-16 surrogate.
    #[error("lone surrogate in \\u escape")]
    LoneSurrogate,
    /// Number literal that violates the JSON number grammar.
    #[error("invalid number literal")]
    InvalidNumber,
    /// String bytes that are not valid UTF-8.
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,
    /// Raw control character inside a string.
    #[error("control character in string")]
    ControlCharacter,
    /// Non-whitespace content after the root value closed.
    #[error("trailing characters after document")]
    TrailingCharacters,
}

/// JSL error types
#[derive(Debug, Error)]
pub enum JslError {
    /// Input is not well-formed JSON.
    #[error("Decode error at byte {offset}: {reason}")]
    Decode {
        /// Absolute byte offset of the offending input.
        offset: u64,
        /// What went wrong.
        reason: DecodeReason,
    },
    /// A configured limit was exceeded while decoding.
    #[error("Limit exceeded at byte {offset}: {what}")]
    LimitExceeded {
        /// Absolute byte offset where the limit tripped.
        offset: u64,
        /// Which limit and its configured value.
        what: String,
    },
    /// The byte source could not be opened.
    #[error("Source unavailable: {source_desc}: {reason}")]
    SourceUnavailable {
        /// Human-readable description of the source.
        source_desc: String,
        /// Underlying failure.
        reason: String,
    },
    /// Path selector could not be parsed.
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector {
        /// The offending selector text.
        selector: String,
        /// Explanation of the problem.
        reason: String,
    },
    /// Options or limits are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// I/O operation failed while reading data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JslError {
    /// Stable, machine-readable error category.
    pub fn kind(&self) -> &'static str {
        match self {
            JslError::Decode { .. } => "decode",
            JslError::LimitExceeded { .. } => "limit",
            JslError::SourceUnavailable { .. } => "source_unavailable",
            JslError::InvalidSelector { .. } => "selector",
            JslError::InvalidConfig(_) => "config",
            JslError::Io(_) => "io",
            JslError::Json(_) => "json",
            JslError::Internal(_) => "internal",
        }
    }

    /// Byte offset attached to the error, when one is known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            JslError::Decode { offset, .. } | JslError::LimitExceeded { offset, .. } => {
                Some(*offset)
            }
            _ => None,
        }
    }

    /// Shorthand for a [`JslError::Decode`].
    pub fn decode(offset: u64, reason: DecodeReason) -> Self {
        JslError::Decode { offset, reason }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, JslError>;
