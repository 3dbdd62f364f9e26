use async_trait::async_trait;

use crate::{
    FlowError, Result,
    workflow::node::{InputData, Node, NodeData, NodeKind},
};

use super::{NodeInputs, Runner};

/// Emits the node's literal text. Upstream values are ignored.
#[derive(Debug, Clone, Default)]
pub struct InputRunner;

#[async_trait]
impl Runner for InputRunner {
    fn kind(&self) -> NodeKind {
        NodeKind::Input
    }

    fn schema(&self) -> serde_json::Value {
        InputData::schema()
    }

    async fn run(
        &self,
        node: &Node,
        _: NodeInputs,
    ) -> Result<String> {
        match &node.data {
            NodeData::Input(data) => Ok(data.text.clone()),
            other => Err(FlowError::SchemaViolation {
                node_id: node.id.clone(),
                reason: format!("input runner cannot execute a '{}' node", other.kind()),
            }),
        }
    }
}
