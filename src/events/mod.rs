//! Lifecycle events of a run.
//!
//! The executor publishes a [`Message`] for every run and node state change
//! so that observers can follow a run without polling it.

mod node;
mod workflow;

pub use node::*;
pub use workflow::*;

use crate::workflow::node::NodeId;

/// Identifier of a single execution of a workflow.
pub type RunId = String;

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type for workflow graph events.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// Run-level events (start, succeeded, failed, cancelled).
    Workflow(WorkflowEvent),
    /// Node-level events (running, succeeded, error, stopped).
    Node(NodeEvent),
}

/// Event message carrying run and node context.
#[derive(Debug, Clone)]
pub struct Message {
    /// Run that generated this event.
    pub run_id: RunId,
    /// Node that generated this event (empty for run-level events).
    pub nid: NodeId,
    pub event: GraphEvent,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl GraphEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, GraphEvent::Workflow(WorkflowEvent::Succeeded))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEvent::Workflow(WorkflowEvent::Failed(_)))
    }

    /// Whether the event ends the run.
    pub fn is_final(&self) -> bool {
        matches!(self, GraphEvent::Workflow(WorkflowEvent::Succeeded | WorkflowEvent::Failed(_) | WorkflowEvent::Cancelled))
    }
}
