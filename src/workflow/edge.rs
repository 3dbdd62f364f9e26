//! Workflow edges.
//!
//! An edge is a directed dependency: its target consumes the output of its
//! source. Edges carry no data of their own.

use crate::workflow::node::NodeId;

/// Unique identifier for an edge within a workflow.
pub type EdgeId = String;

/// Runtime edge representation connecting two nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edge {
    /// Unique edge identifier.
    pub id: EdgeId,
    /// ID of the source node.
    pub source: NodeId,
    /// ID of the target node.
    pub target: NodeId,
    /// Output port on the source. `None` is the node's single implicit port.
    pub source_port: Option<String>,
    /// Input port on the target. `None` is the node's single implicit port.
    pub target_port: Option<String>,
    /// Editor hint, kept for round-tripping.
    pub animated: bool,
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_ports(
        mut self,
        source_port: Option<String>,
        target_port: Option<String>,
    ) -> Self {
        self.source_port = source_port;
        self.target_port = target_port;
        self
    }

    /// Whether either endpoint is `nid`.
    pub fn touches(
        &self,
        nid: &str,
    ) -> bool {
        self.source == nid || self.target == nid
    }
}
