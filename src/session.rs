//! Single-writer editing session.
//!
//! The editor mutates its graph only through [`EditorSession`]. Runs and
//! saves work on a [`Snapshot`]: an immutable copy taken under the read lock
//! and stamped with the generation it was taken at, so edits made while a
//! run is in flight only affect the next snapshot.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::{
    FlowError, Result, ShareLock,
    executor::ExecutionResult,
    workflow::{
        Workflow,
        edge::{Edge, EdgeId},
        node::{Node, NodeData, NodeId, Position},
    },
};

/// An immutable view of the session's graph.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// generation the snapshot was taken at
    pub generation: u64,
    pub workflow: Arc<Workflow>,
}

struct State {
    generation: u64,
    workflow: Arc<Workflow>,
    next_id: u64,
}

#[derive(Clone)]
pub struct EditorSession {
    state: ShareLock<State>,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession {
    /// A session holding the seed graph.
    pub fn new() -> Self {
        Self::with_workflow(Workflow::seed())
    }

    pub fn with_workflow(workflow: Workflow) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                generation: 0,
                next_id: first_free_id(&workflow),
                workflow: Arc::new(workflow),
            })),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.read();
        Snapshot {
            generation: state.generation,
            workflow: state.workflow.clone(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Adds a node with a freshly generated id.
    pub fn add_node(
        &self,
        data: NodeData,
        position: Position,
    ) -> Result<NodeId> {
        self.update(|state| {
            let id = loop {
                let candidate = state.next_id.to_string();
                if !state.workflow.is_id_taken(&candidate) {
                    state.next_id = state.next_id.saturating_add(1);
                    break candidate;
                }
                state.next_id = state.next_id.checked_add(1).ok_or_else(|| FlowError::Engine("node ids exhausted".to_string()))?;
            };
            Arc::make_mut(&mut state.workflow).add_node(Node::new(id.clone(), data).at(position))?;
            debug!(node_id = %id, "node added");
            Ok(id)
        })
    }

    /// Removes a node and its incident edges, returning the removed edges.
    pub fn remove_node(
        &self,
        id: &str,
    ) -> Result<Vec<Edge>> {
        self.update(|state| Arc::make_mut(&mut state.workflow).remove_node(id).map(|(_, edges)| edges))
    }

    /// Connects `source` to `target`. The graph is not validated here.
    pub fn connect(
        &self,
        source: &str,
        target: &str,
    ) -> Result<EdgeId> {
        self.update(|state| {
            let base = format!("e{source}-{target}");
            let mut id = base.clone();
            let mut suffix = 1;
            while state.workflow.is_id_taken(&id) {
                id = format!("{base}-{suffix}");
                suffix += 1;
            }
            Arc::make_mut(&mut state.workflow).add_edge(Edge::new(id.clone(), source, target))?;
            Ok(id)
        })
    }

    pub fn remove_edge(
        &self,
        id: &str,
    ) -> Result<Edge> {
        self.update(|state| Arc::make_mut(&mut state.workflow).remove_edge(id))
    }

    /// Shallow-merges `patch` into a node's data.
    pub fn patch_node_data(
        &self,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<()> {
        self.update(|state| Arc::make_mut(&mut state.workflow).patch_node_data(id, patch))
    }

    pub fn set_node_position(
        &self,
        id: &str,
        position: Position,
    ) -> Result<()> {
        self.update(|state| Arc::make_mut(&mut state.workflow).set_node_position(id, position))
    }

    /// Replaces the whole graph, as on load.
    pub fn replace(
        &self,
        workflow: Workflow,
    ) {
        let mut state = self.write();
        state.next_id = first_free_id(&workflow);
        state.workflow = Arc::new(workflow);
        state.generation += 1;
    }

    /// Writes a run's terminal values into the matching output nodes.
    ///
    /// Nodes removed since the run started are skipped.
    pub fn record_results(
        &self,
        result: &ExecutionResult,
    ) -> Result<()> {
        self.update(|state| {
            let workflow = Arc::make_mut(&mut state.workflow);
            for (nid, value) in result.outputs.iter() {
                let Some(NodeData::Output(data)) = workflow.node(nid).map(|n| &n.data) else {
                    continue;
                };
                let mut data = data.clone();
                data.result = Some(value.clone());
                workflow.set_node_data(nid, NodeData::Output(data))?;
            }
            Ok(())
        })
    }

    /// Applies `f` and bumps the generation if it succeeds.
    ///
    /// A failed mutation leaves the graph untouched.
    fn update<T>(
        &self,
        f: impl FnOnce(&mut State) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.write();
        let (workflow, next_id) = (state.workflow.clone(), state.next_id);
        match f(&mut *state) {
            Ok(value) => {
                state.generation += 1;
                Ok(value)
            }
            Err(e) => {
                state.workflow = workflow;
                state.next_id = next_id;
                Err(e)
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Smallest numeric id above every numeric node id in `workflow`.
fn first_free_id(workflow: &Workflow) -> u64 {
    workflow.nodes().filter_map(|n| n.id.parse::<u64>().ok()).max().map_or(1, |max| max.saturating_add(1))
}

impl From<&Snapshot> for Workflow {
    fn from(snapshot: &Snapshot) -> Self {
        snapshot.workflow.as_ref().clone()
    }
}
