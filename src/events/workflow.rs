use crate::workflow::node::NodeId;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    Start(WorkflowStartEvent),
    Succeeded,
    Failed(WorkflowFailedEvent),
    Cancelled,
}

impl WorkflowEvent {
    pub fn str(&self) -> &str {
        match self {
            WorkflowEvent::Start(_) => "Running",
            WorkflowEvent::Succeeded => "Succeeded",
            WorkflowEvent::Failed(_) => "Failed",
            WorkflowEvent::Cancelled => "Cancelled",
        }
    }
}

/// Event emitted when a run starts
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStartEvent {
    /// node ids in the order they will run
    pub node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowFailedEvent {
    pub error: String,
}
