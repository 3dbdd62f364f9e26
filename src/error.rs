//! Error types for MicroFlow.
//!
//! Every failure the engine can report is a variant of [`FlowError`].
//! A finished run additionally says *where* it failed through [`RunError`],
//! so callers can tell a graph that never ran from one that ran and broke.

use std::{collections::BTreeMap, io::ErrorKind, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::node::NodeId;

/// Unified error type for all MicroFlow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// An edge references a node that is not in the graph.
    #[error("edge '{edge_id}' references missing node '{node_id}'")]
    DanglingEdge {
        edge_id: String,
        node_id: NodeId,
    },

    /// The graph is not a DAG. `nodes` lists the nodes left unconsumed by the sort.
    #[error("cycle detected involving nodes [{}]", .nodes.join(", "))]
    CycleDetected {
        nodes: Vec<NodeId>,
    },

    /// Node data malformed for its kind, or port arity violated.
    #[error("node '{node_id}' violates its schema: {reason}")]
    SchemaViolation {
        node_id: NodeId,
        reason: String,
    },

    /// Workflow file could not be imported.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The llm node's model reference could not be resolved.
    #[error("model '{model}' not found: {message}")]
    ModelNotFound {
        model: String,
        message: String,
    },

    /// The inference backend ran out of memory or another resource.
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    /// Any other inference backend error.
    #[error("inference failed: {0}")]
    InferenceFailure(String),

    /// Inference did not finish in time. Counts as an inference failure.
    #[error("inference timed out after {0:?}")]
    InferenceTimeout(Duration),

    /// A node that needs an upstream value received none.
    #[error("node '{node_id}' has no upstream input")]
    MissingInput {
        node_id: NodeId,
    },

    /// The run was cancelled before it completed.
    #[error("run cancelled")]
    Cancelled,

    /// A node or edge id is already taken, or was used earlier in this graph.
    #[error("id '{0}' is already in use")]
    DuplicateId(String),

    #[error("node '{0}' not found")]
    NodeNotFound(NodeId),

    #[error("edge '{0}' not found")]
    EdgeNotFound(String),

    /// Engine-level errors (missing runtime, bad builder input).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors.
    #[error("{0}")]
    Convert(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

/// Failures while importing a workflow file.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum SerializationError {
    /// `version` is missing or not one this build understands.
    #[error("unsupported workflow version: {}", .0.as_deref().unwrap_or("<missing>"))]
    UnsupportedVersion(Option<String>),

    /// A node lacks a field its kind requires, or carries an invalid value.
    #[error("malformed node '{node_id}': {reason}")]
    MalformedNode {
        node_id: NodeId,
        reason: String,
    },

    /// The document is not a workflow file at all.
    #[error("malformed workflow document: {0}")]
    MalformedDocument(String),

    /// Two nodes or two edges share an id.
    #[error("duplicate id '{0}' in workflow document")]
    DuplicateId(String),
}

impl FlowError {
    /// True for every failure raised by graph validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, FlowError::DanglingEdge { .. } | FlowError::CycleDetected { .. } | FlowError::SchemaViolation { .. })
    }

    /// True for inference failures, timeouts included.
    pub fn is_inference_failure(&self) -> bool {
        matches!(self, FlowError::InferenceFailure(_) | FlowError::InferenceTimeout(_))
    }
}

/// Node outputs computed before a run stopped.
pub type PartialOutputs = BTreeMap<NodeId, String>;

/// Outcome of a run that did not complete normally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    /// The graph was rejected before any node executed.
    #[error("workflow rejected: {0}")]
    Invalid(FlowError),

    /// A node failed; the run stopped there.
    #[error("node '{node_id}' failed: {error}")]
    NodeFailed {
        node_id: NodeId,
        error: FlowError,
        partial: PartialOutputs,
    },

    /// The run was cancelled by its caller.
    #[error("run cancelled")]
    Cancelled {
        partial: PartialOutputs,
    },
}

impl RunError {
    /// The underlying failure kind.
    pub fn error(&self) -> FlowError {
        match self {
            RunError::Invalid(e) => e.clone(),
            RunError::NodeFailed {
                error,
                ..
            } => error.clone(),
            RunError::Cancelled {
                ..
            } => FlowError::Cancelled,
        }
    }

    /// Outputs produced before the failure. `None` when the graph never ran.
    pub fn partial(&self) -> Option<&PartialOutputs> {
        match self {
            RunError::Invalid(_) => None,
            RunError::NodeFailed {
                partial,
                ..
            }
            | RunError::Cancelled {
                partial,
            } => Some(partial),
        }
    }
}

impl From<FlowError> for String {
    fn from(val: FlowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for FlowError {
    fn from(error: std::io::Error) -> Self {
        FlowError::IoError(error.to_string())
    }
}

impl From<FlowError> for std::io::Error {
    fn from(val: FlowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(error: serde_json::Error) -> Self {
        FlowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for FlowError {
    fn from(error: toml::de::Error) -> Self {
        FlowError::Config(error.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cycle_message_names_nodes() {
        let err = FlowError::CycleDetected {
            nodes: vec!["A".into(), "B".into()],
        };
        assert_eq!(err.to_string(), "cycle detected involving nodes [A, B]");
        assert!(err.is_validation());
    }

    #[test]
    fn test_missing_version_message() {
        let err: FlowError = SerializationError::UnsupportedVersion(None).into();
        assert_eq!(err.to_string(), "unsupported workflow version: <missing>");
    }

    #[test]
    fn test_run_error_kinds() {
        let invalid = RunError::Invalid(FlowError::Cancelled);
        assert!(invalid.partial().is_none());

        let mut partial = PartialOutputs::new();
        partial.insert("A".into(), "hi".into());
        let failed = RunError::NodeFailed {
            node_id: "B".into(),
            error: FlowError::InferenceTimeout(Duration::from_secs(1)),
            partial: partial.clone(),
        };
        assert!(failed.error().is_inference_failure());
        assert_eq!(failed.partial(), Some(&partial));
    }
}
