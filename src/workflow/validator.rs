//! Structural validation of workflow graphs.
//!
//! Validation runs in a fixed order: edge references first, then cycle
//! detection (which assumes every reference resolves), then per-node data
//! checks. A successful validation yields the topological order the executor
//! runs nodes in. Ties between ready nodes break by ascending node id, so the
//! order is a pure function of the graph.

use std::{
    cmp::Reverse,
    collections::{BTreeSet, BinaryHeap, HashMap, HashSet},
};

use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};

use crate::{
    FlowError, Result,
    workflow::{Workflow, node::NodeId, registry::RunnerRegistry},
};

/// Checks a bare edge list for cycles.
///
/// The node set is every id mentioned by an edge, so references cannot dangle.
pub fn detect_cycles(edges: &[(String, String)]) -> Result<()> {
    let ids: BTreeSet<&str> = edges.iter().flat_map(|(s, t)| [s.as_str(), t.as_str()]).collect();
    let pairs: Vec<(&str, &str)> = edges.iter().map(|(s, t)| (s.as_str(), t.as_str())).collect();
    topological_order(&ids.into_iter().collect::<Vec<_>>(), &pairs).map(|_| ())
}

/// Validates `workflow` as an executable DAG and returns its topological order.
pub fn validate(workflow: &Workflow) -> Result<Vec<NodeId>> {
    check_references(workflow)?;

    let ids: Vec<&str> = workflow.nodes().map(|n| n.id.as_str()).collect();
    let pairs: Vec<(&str, &str)> = workflow.edges().iter().map(|e| (e.source.as_str(), e.target.as_str())).collect();
    let order = topological_order(&ids, &pairs)?;

    for node in workflow.nodes() {
        node.data.check().map_err(|reason| FlowError::SchemaViolation {
            node_id: node.id.clone(),
            reason,
        })?;
    }

    Ok(order)
}

/// Like [`validate`], and also checks every node against the runner registered for its kind.
pub fn validate_with(
    workflow: &Workflow,
    registry: &RunnerRegistry,
) -> Result<Vec<NodeId>> {
    let order = validate(workflow)?;

    for node in workflow.nodes() {
        let runner = registry.get(&node.kind()).ok_or_else(|| FlowError::SchemaViolation {
            node_id: node.id.clone(),
            reason: format!("no runner registered for kind '{}'", node.kind()),
        })?;

        let data = node.data.to_value()?;
        jsonschema::validate(&runner.schema(), &data).map_err(|e| FlowError::SchemaViolation {
            node_id: node.id.clone(),
            reason: e.to_string(),
        })?;

        // terminal values end the run; edges into input nodes stay legal and are ignored
        if runner.is_terminal() {
            if let Some(edge) = workflow.outgoing(&node.id).next() {
                return Err(FlowError::SchemaViolation {
                    node_id: node.id.clone(),
                    reason: format!("terminal node feeds '{}' through edge '{}'", edge.target, edge.id),
                });
            }
        }

        let producers: HashSet<&str> = workflow.incoming(&node.id).map(|e| e.source.as_str()).collect();
        runner.arity().check(producers.len()).map_err(|reason| FlowError::SchemaViolation {
            node_id: node.id.clone(),
            reason,
        })?;
    }

    Ok(order)
}

/// Every edge endpoint must name an existing node. Sources are checked before targets.
fn check_references(workflow: &Workflow) -> Result<()> {
    for edge in workflow.edges() {
        for endpoint in [&edge.source, &edge.target] {
            if !workflow.contains_node(endpoint) {
                return Err(FlowError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm with a min-heap of ready nodes.
///
/// `ids` must be unique and cover every endpoint in `edges`.
fn topological_order(
    ids: &[&str],
    edges: &[(&str, &str)],
) -> Result<Vec<NodeId>> {
    let mut graph = DiGraph::<&str, ()>::with_capacity(ids.len(), edges.len());
    let index: HashMap<&str, NodeIndex> = ids.iter().map(|id| (*id, graph.add_node(*id))).collect();
    for (source, target) in edges {
        if let (Some(s), Some(t)) = (index.get(source), index.get(target)) {
            graph.add_edge(*s, *t, ());
        }
    }

    // parallel edges count once per edge on both sides, so the bookkeeping stays balanced
    let mut in_degree: Vec<usize> = graph.node_indices().map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count()).collect();

    let mut ready: BinaryHeap<Reverse<(&str, NodeIndex)>> =
        graph.node_indices().filter(|idx| in_degree[idx.index()] == 0).map(|idx| Reverse((graph[idx], idx))).collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse((id, idx))) = ready.pop() {
        order.push(id.to_string());
        for succ in graph.neighbors_directed(idx, Direction::Outgoing) {
            in_degree[succ.index()] -= 1;
            if in_degree[succ.index()] == 0 {
                ready.push(Reverse((graph[succ], succ)));
            }
        }
    }

    if order.len() == graph.node_count() {
        return Ok(order);
    }

    // Name the nodes that sit on a cycle, not the ones merely downstream of one.
    let mut nodes: Vec<NodeId> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|idx| graph[idx].to_string())
        .collect();
    nodes.sort();

    Err(FlowError::CycleDetected {
        nodes,
    })
}
