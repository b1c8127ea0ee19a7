pub mod parser;
pub mod timestamp;

use serde::{Deserialize, Serialize};

use crate::frames::StillFrame;

pub use parser::{parse, DEFAULT_SUMMARY, SEPARATOR};
pub use timestamp::{Timestamp, TimestampError};

/// One procedural step extracted from the AI response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    /// Short label of the action
    pub title: String,

    /// Free-text explanation, empty when the response had none
    pub description: String,

    /// Position in the source video, bracket decoration already removed
    pub timestamp: String,

    /// Illustration captured at `timestamp`, once sampled
    #[serde(skip)]
    pub frame: Option<StillFrame>,
}

impl StepRecord {
    pub fn new(title: impl Into<String>, description: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            timestamp: timestamp.into(),
            frame: None,
        }
    }

    /// Offset of this step, if its timestamp follows the `SS` / `MM:SS` grammar
    pub fn offset(&self) -> Result<Timestamp, TimestampError> {
        Timestamp::parse(&self.timestamp)
    }

    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }
}

/// Ordered steps plus the global summary of one AI response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParseResult {
    pub summary: String,
    pub steps: Vec<StepRecord>,
}

impl ParseResult {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True when the response carried a RESUME block
    pub fn has_summary(&self) -> bool {
        self.summary != DEFAULT_SUMMARY
    }
}
