//! In-memory workflow graph.
//!
//! `Workflow` is a plain data container: a map of nodes keyed by id and a
//! sequence of edges. It performs no validation beyond id uniqueness; edges
//! may reference missing nodes and the graph may contain cycles while it is
//! being edited. The validator enforces the DAG invariants at run and save
//! boundaries.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    FlowError, Result,
    workflow::{
        edge::{Edge, EdgeId},
        node::{InputData, LlmData, Node, NodeData, NodeId, OutputData, Position},
    },
};

/// A directed graph of typed processing stages.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Edge>,
    /// Ids removed from this graph instance; never handed out again.
    retired_nodes: BTreeSet<NodeId>,
    retired_edges: BTreeSet<EdgeId>,
}

impl PartialEq for Workflow {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl Workflow {
    /// create an empty workflow
    pub fn new() -> Self {
        Self::default()
    }

    /// The graph a fresh editor starts with: input → llm → output.
    pub fn seed() -> Self {
        let mut workflow = Self::new();
        let nodes = [
            Node::new(
                "1",
                NodeData::Input(InputData {
                    label: Some("Text Input".to_string()),
                    text: String::new(),
                }),
            )
            .at(Position::new(100.0, 100.0)),
            Node::new(
                "2",
                NodeData::Llm(LlmData {
                    label: Some("LLM Model".to_string()),
                    ..Default::default()
                }),
            )
            .at(Position::new(300.0, 100.0)),
            Node::new(
                "3",
                NodeData::Output(OutputData {
                    label: Some("Output".to_string()),
                    result: None,
                }),
            )
            .at(Position::new(500.0, 100.0)),
        ];
        for node in nodes {
            workflow.nodes.insert(node.id.clone(), node);
        }
        workflow.edges.push(Edge::new("e1-2", "1", "2"));
        workflow.edges.push(Edge::new("e2-3", "2", "3"));
        workflow
    }

    /// Builds a workflow from parts, rejecting duplicate node or edge ids.
    pub fn from_parts(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Result<Self> {
        let mut workflow = Self::new();
        for node in nodes {
            workflow.add_node(node)?;
        }
        for edge in edges {
            workflow.add_edge(edge)?;
        }
        Ok(workflow)
    }

    /// Output a human-readable representation of the workflow graph
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push("=== Workflow Graph ===".to_string());
        lines.push(format!("Nodes: {}, Edges: {}", self.nodes.len(), self.edges.len()));
        lines.push(String::new());

        lines.push("--- Nodes ---".to_string());
        for node in self.nodes.values() {
            lines.push(format!("[{}] (kind: {})", node.id, node.kind()));
        }
        lines.push(String::new());

        lines.push("--- Edges ---".to_string());
        for edge in self.edges.iter() {
            lines.push(format!("{} --> {} (id: {})", edge.source, edge.target, edge.id));
        }
        lines.push(String::new());

        lines.push("--- Graph Structure ---".to_string());
        for node in self.nodes.values() {
            let outgoing: Vec<&str> = self.outgoing(&node.id).map(|e| e.target.as_str()).collect();
            if outgoing.is_empty() {
                lines.push(format!("{} -> (end)", node.id));
            } else {
                lines.push(format!("{} -> {}", node.id, outgoing.join(", ")));
            }
        }

        lines.join("\n")
    }

    /// all nodes, ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// all edges, in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// get node by id
    pub fn node(
        &self,
        id: &str,
    ) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// get edge by id
    pub fn edge(
        &self,
        id: &str,
    ) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn contains_node(
        &self,
        id: &str,
    ) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// edges whose target is `nid`
    pub fn incoming<'a>(
        &'a self,
        nid: &'a str,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == nid)
    }

    /// edges whose source is `nid`
    pub fn outgoing<'a>(
        &'a self,
        nid: &'a str,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == nid)
    }

    /// Whether `id` was ever used for a node or edge in this graph instance.
    pub fn is_id_taken(
        &self,
        id: &str,
    ) -> bool {
        self.nodes.contains_key(id) || self.retired_nodes.contains(id) || self.edges.iter().any(|e| e.id == id) || self.retired_edges.contains(id)
    }

    /// Adds a node. Nodes that cannot round-trip through a workflow file are refused.
    pub fn add_node(
        &mut self,
        node: Node,
    ) -> Result<()> {
        node.check_shape()?;
        if self.nodes.contains_key(&node.id) || self.retired_nodes.contains(&node.id) {
            return Err(FlowError::DuplicateId(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Removes a node together with every edge incident to it.
    pub fn remove_node(
        &mut self,
        id: &str,
    ) -> Result<(Node, Vec<Edge>)> {
        let node = self.nodes.remove(id).ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        self.retired_nodes.insert(node.id.clone());

        let (removed, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges).into_iter().partition(|e| e.touches(id));
        self.edges = kept;
        self.retired_edges.extend(removed.iter().map(|e| e.id.clone()));

        Ok((node, removed))
    }

    /// Adds an edge. Endpoints are not checked here.
    pub fn add_edge(
        &mut self,
        edge: Edge,
    ) -> Result<()> {
        if self.edges.iter().any(|e| e.id == edge.id) || self.retired_edges.contains(&edge.id) {
            return Err(FlowError::DuplicateId(edge.id));
        }
        self.edges.push(edge);
        Ok(())
    }

    /// remove edge by id
    pub fn remove_edge(
        &mut self,
        id: &str,
    ) -> Result<Edge> {
        let idx = self.edges.iter().position(|e| e.id == id).ok_or_else(|| FlowError::EdgeNotFound(id.to_string()))?;
        let edge = self.edges.remove(idx);
        self.retired_edges.insert(edge.id.clone());
        Ok(edge)
    }

    /// Replaces a node's data, possibly changing its kind.
    pub fn set_node_data(
        &mut self,
        id: &str,
        data: NodeData,
    ) -> Result<()> {
        let node = self.nodes.get_mut(id).ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        let previous = std::mem::replace(&mut node.data, data);
        if let Err(e) = node.check_shape() {
            node.data = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Shallow-merges a JSON object into a node's data, keeping its kind.
    pub fn patch_node_data(
        &mut self,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<()> {
        let node = self.nodes.get_mut(id).ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        node.patch_data(patch)
    }

    pub fn set_node_position(
        &mut self,
        id: &str,
        position: Position,
    ) -> Result<()> {
        if !position.is_finite() {
            return Err(FlowError::SchemaViolation {
                node_id: id.to_string(),
                reason: format!("position ({}, {}) is not finite", position.x, position.y),
            });
        }
        let node = self.nodes.get_mut(id).ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        node.position = position;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::workflow::node::NodeKind;

    #[test]
    fn test_seed_graph() {
        let wf = Workflow::seed();
        assert_eq!(wf.node_count(), 3);
        assert_eq!(wf.edge_count(), 2);
        assert_eq!(wf.node("1").unwrap().kind(), NodeKind::Input);
        assert_eq!(wf.node("2").unwrap().kind(), NodeKind::Llm);
        assert_eq!(wf.node("3").unwrap().kind(), NodeKind::Output);
        assert_eq!(wf.incoming("3").map(|e| e.source.as_str()).collect::<Vec<_>>(), vec!["2"]);
        assert_eq!(wf.outgoing("1").map(|e| e.target.as_str()).collect::<Vec<_>>(), vec!["2"]);
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let mut wf = Workflow::seed();
        let (node, removed) = wf.remove_node("2").unwrap();
        assert_eq!(node.id, "2");
        assert_eq!(removed.len(), 2);
        assert_eq!(wf.edge_count(), 0);
        assert!(wf.edges().iter().all(|e| !e.touches("2")));
    }

    #[test]
    fn test_ids_never_reused() {
        let mut wf = Workflow::seed();
        assert!(matches!(wf.add_node(Node::output("3")), Err(FlowError::DuplicateId(_))));

        wf.remove_node("3").unwrap();
        assert!(matches!(wf.add_node(Node::output("3")), Err(FlowError::DuplicateId(_))));
        assert!(matches!(wf.add_edge(Edge::new("e2-3", "2", "1")), Err(FlowError::DuplicateId(_))));
        assert!(wf.is_id_taken("3"));
    }

    #[test]
    fn test_dangling_edges_are_legal_to_construct() {
        let mut wf = Workflow::new();
        wf.add_node(Node::input("A", "hi")).unwrap();
        wf.add_edge(Edge::new("e1", "A", "Z")).unwrap();
        assert_eq!(wf.edge_count(), 1);
    }

    #[test]
    fn test_summary_lists_structure() {
        let summary = Workflow::seed().summary();
        assert!(summary.contains("Nodes: 3, Edges: 2"));
        assert!(summary.contains("1 -> 2"));
        assert!(summary.contains("3 -> (end)"));
    }

    #[test]
    fn test_refuses_nodes_that_cannot_be_saved() {
        let mut wf = Workflow::new();
        let shadowed = Node::new(
            "A",
            NodeData::Other {
                kind: "input".into(),
                data: serde_json::json!({}),
            },
        );
        assert!(matches!(wf.add_node(shadowed), Err(FlowError::SchemaViolation { .. })));
        let unnamed = Node::new(
            "B",
            NodeData::Other {
                kind: String::new(),
                data: serde_json::Value::Null,
            },
        );
        assert!(matches!(wf.add_node(unnamed), Err(FlowError::SchemaViolation { .. })));
        assert!(matches!(wf.add_node(Node::output("")), Err(FlowError::SchemaViolation { .. })));
        assert!(matches!(wf.add_node(Node::output("C").at(Position::new(f64::NAN, 0.0))), Err(FlowError::SchemaViolation { .. })));
        assert_eq!(wf.node_count(), 0);

        wf.add_node(Node::output("C")).unwrap();
        assert!(matches!(wf.set_node_position("C", Position::new(0.0, f64::INFINITY)), Err(FlowError::SchemaViolation { .. })));
        assert!(matches!(wf.set_node_data("C", NodeData::Llm(LlmData::new("m").with_temperature(f64::NAN))), Err(FlowError::SchemaViolation { .. })));
        assert_eq!(wf.node("C").unwrap().data, NodeData::Output(OutputData::default()));
        assert_eq!(wf.node("C").unwrap().position, Position::default());
    }

    #[test]
    fn test_equality_ignores_retired_ids() {
        let mut a = Workflow::seed();
        a.add_node(Node::output("4")).unwrap();
        a.remove_node("4").unwrap();
        assert_eq!(a, Workflow::seed());
    }
}
