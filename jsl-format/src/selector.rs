//! Path selectors naming which values count as records
//!
//! A selector is a dot-separated list of segments. The segment `item` stands
//! for "any element of the array at this level"; every other segment is an
//! object key. A value is selected when its path from the root equals the
//! selector exactly:
//!
//! - `""` selects the whole document as one record
//! - `item` selects each element of a root-level array
//! - `data.rows.item` selects each element of the array under `data.rows`
//! - `meta` selects the single value under the root key `meta`

use crate::constants::ITEM_SEGMENT;
use crate::error::{JslError, Result};
use crate::limits::Limits;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// One step of a selector path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Any array element
    Item,
    /// Object member with this key
    Key(String),
}

impl Segment {
    fn parse(text: &str) -> Self {
        if text == ITEM_SEGMENT {
            Segment::Item
        } else {
            Segment::Key(text.to_string())
        }
    }
}

/// Parsed, validated path selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSelector {
    text: String,
    segments: SmallVec<[Segment; 4]>,
}

impl PathSelector {
    /// Parse and validate a selector against the supplied limits
    pub fn parse(text: &str, limits: &Limits) -> Result<Self> {
        if text.len() > limits.max_selector_length {
            return Err(JslError::InvalidSelector {
                selector: text.to_string(),
                reason: format!(
                    "length {} exceeds limit {}",
                    text.len(),
                    limits.max_selector_length
                ),
            });
        }

        if text.is_empty() {
            return Ok(Self::document());
        }

        let mut segments = SmallVec::new();
        for part in text.split('.') {
            if part.is_empty() {
                return Err(JslError::InvalidSelector {
                    selector: text.to_string(),
                    reason: "empty segment (leading, trailing or doubled '.')".to_string(),
                });
            }
            segments.push(Segment::parse(part));
        }

        if segments.len() > limits.max_selector_segments {
            return Err(JslError::InvalidSelector {
                selector: text.to_string(),
                reason: format!(
                    "{} segments exceeds limit {}",
                    segments.len(),
                    limits.max_selector_segments
                ),
            });
        }

        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// Selector treating the whole document as a single record
    pub fn document() -> Self {
        Self {
            text: String::new(),
            segments: SmallVec::new(),
        }
    }

    /// Selector iterating the elements of a root-level array
    pub fn items() -> Self {
        let mut segments = SmallVec::new();
        segments.push(Segment::Item);
        Self {
            text: ITEM_SEGMENT.to_string(),
            segments,
        }
    }

    /// Parsed segments, outermost first
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments; the structural depth at which records live
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Whether the whole document is one record
    pub fn is_document(&self) -> bool {
        self.segments.is_empty()
    }

    /// Original selector text
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Default for PathSelector {
    fn default() -> Self {
        Self::items()
    }
}

impl FromStr for PathSelector {
    type Err = JslError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, &Limits::default())
    }
}

impl fmt::Display for PathSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
