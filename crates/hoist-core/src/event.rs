//! Log lines and stream events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::ImageReference;

/// A normalized line of build or push output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

impl LogLine {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            content: content.into(),
        }
    }
}

/// Item of a build or push stream.
///
/// Completion is reported with a dedicated variant so callers never have to
/// pattern-match log text to find the resulting image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    Log(LogLine),
    BuildCompleted { image: ImageReference },
    PushCompleted { repository: String },
}

impl BuildEvent {
    pub fn log(content: impl Into<String>) -> Self {
        BuildEvent::Log(LogLine::new(content))
    }

    pub fn is_completion(&self) -> bool {
        !matches!(self, BuildEvent::Log(_))
    }
}
