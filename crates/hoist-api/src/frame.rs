//! Newline-delimited JSON records streamed to clients.

use hoist_core::{BuildEvent, Error, Result};
use serde::Serialize;

/// One line of a build or push response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Log { line: String },
    BuildCompleted { image: String },
    PushCompleted { repository: String },
    Error { kind: &'static str, message: String },
}

impl From<Result<BuildEvent>> for Frame {
    fn from(item: Result<BuildEvent>) -> Self {
        match item {
            Ok(BuildEvent::Log(line)) => Frame::Log { line: line.content },
            Ok(BuildEvent::BuildCompleted { image }) => Frame::BuildCompleted {
                image: image.to_string(),
            },
            Ok(BuildEvent::PushCompleted { repository }) => Frame::PushCompleted { repository },
            Err(err) => Frame::from(err),
        }
    }
}

impl From<Error> for Frame {
    fn from(err: Error) -> Self {
        Frame::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl Frame {
    /// Serialize as a single NDJSON line.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "kind": "internal", "message": e.to_string() })
                .to_string()
        });
        line.push('\n');
        line
    }
}
