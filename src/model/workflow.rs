use serde::{Deserialize, Serialize};

use crate::{FlowError, Result, SerializationError};

use super::{EdgeModel, NodeModel};

/// Schema version written by this build.
pub const CURRENT_VERSION: &str = "1.0";
/// Schema versions this build can read.
pub const SUPPORTED_VERSIONS: &[&str] = &[CURRENT_VERSION];
/// Conventional file extension of workflow files.
pub const WORKFLOW_FILE_EXTENSION: &str = "mflow";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub nodes: Vec<NodeModel>,
    #[serde(default)]
    pub edges: Vec<EdgeModel>,
}

impl WorkflowModel {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<WorkflowModel>(s).map_err(|e| FlowError::from(SerializationError::MalformedDocument(e.to_string())))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
