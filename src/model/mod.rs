//! Serde types of the workflow file (`.mflow`).
//!
//! These mirror the document layout exactly and carry no invariants; the
//! serializer turns them into a typed [`crate::Workflow`].

mod edge;
mod node;
mod workflow;

pub use edge::EdgeModel;
pub use node::NodeModel;
pub use workflow::{CURRENT_VERSION, SUPPORTED_VERSIONS, WORKFLOW_FILE_EXTENSION, WorkflowModel};
