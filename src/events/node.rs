use std::{fmt, time::Duration};

use crate::FlowError;

/// State change of one node within a run. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Running(i64),
    Succeeded(i64),
    Error(ErrorReason),
    /// the node was interrupted by cancellation or by another node's failure
    Stopped(i64),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "Running",
            NodeEvent::Succeeded(_) => "Succeeded",
            NodeEvent::Error(_) => "Error",
            NodeEvent::Stopped(_) => "Stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorReason {
    Timeout(Duration),
    Failed(String),
}

impl From<&FlowError> for ErrorReason {
    fn from(err: &FlowError) -> Self {
        match err {
            FlowError::InferenceTimeout(limit) => ErrorReason::Timeout(*limit),
            other => ErrorReason::Failed(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ErrorReason::Timeout(limit) => write!(f, "Timeout after {:?}", limit),
            ErrorReason::Failed(msg) => write!(f, "Failed: {}", msg),
        }
    }
}
