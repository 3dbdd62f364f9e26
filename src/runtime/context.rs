use std::{collections::BTreeMap, sync::Arc};

use crate::{
    error::PartialOutputs,
    events::{Event, GraphEvent, Message, NodeEvent, RunId},
    runtime::Channel,
    workflow::{node::NodeId, runners::NodeInputs},
};

/// Per-run store of node outputs.
///
/// Owned by exactly one dispatch loop and dropped with it, so it needs no
/// locking. Only the values of completed nodes are ever stored.
pub struct ExecutionContext {
    run_id: RunId,
    outputs: PartialOutputs,
    terminal: BTreeMap<NodeId, String>,
    order: Vec<NodeId>,
    channel: Arc<Channel>,
}

impl ExecutionContext {
    pub fn new(
        run_id: RunId,
        channel: Arc<Channel>,
    ) -> Self {
        Self {
            run_id,
            outputs: PartialOutputs::new(),
            terminal: BTreeMap::new(),
            order: Vec::new(),
            channel,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Records that `nid` has been handed to its runner.
    pub fn mark_started(
        &mut self,
        nid: &str,
    ) {
        self.order.push(nid.to_string());
    }

    pub fn add_output(
        &mut self,
        nid: NodeId,
        value: String,
        terminal: bool,
    ) {
        if terminal {
            self.terminal.insert(nid.clone(), value.clone());
        }
        self.outputs.insert(nid, value);
    }

    pub fn is_done(
        &self,
        nid: &str,
    ) -> bool {
        self.outputs.contains_key(nid)
    }

    /// Collects the values of `predecessors`, keeping their order.
    ///
    /// Producers that have not completed are skipped; the runner decides
    /// whether a missing value is an error.
    pub fn gather(
        &self,
        predecessors: &[NodeId],
    ) -> NodeInputs {
        NodeInputs::new(predecessors.iter().filter_map(|p| self.outputs.get(p).map(|v| (p.clone(), v.clone()))).collect())
    }

    /// Publishes `event` on the run's channel. Nobody listening is fine.
    pub fn emit(
        &self,
        nid: &str,
        event: GraphEvent,
    ) {
        let _ = self.channel.event_queue().send(Event::new(&Message {
            run_id: self.run_id.clone(),
            nid: nid.to_string(),
            event,
        }));
    }

    pub fn emit_node(
        &self,
        nid: &str,
        event: NodeEvent,
    ) {
        self.emit(nid, GraphEvent::Node(event));
    }

    /// Consumes the context, returning `(order, outputs, terminal outputs)`.
    pub fn into_parts(self) -> (Vec<NodeId>, PartialOutputs, BTreeMap<NodeId, String>) {
        (self.order, self.outputs, self.terminal)
    }

    /// Everything computed so far.
    pub fn into_partial(self) -> PartialOutputs {
        self.outputs
    }
}
