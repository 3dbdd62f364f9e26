use async_trait::async_trait;

use crate::{
    FlowError, Result,
    workflow::node::{Node, NodeKind, OutputData},
};

use super::{Arity, NodeInputs, Runner};

/// Sink node: passes its single upstream value through as a terminal result.
#[derive(Debug, Clone, Default)]
pub struct OutputRunner;

#[async_trait]
impl Runner for OutputRunner {
    fn kind(&self) -> NodeKind {
        NodeKind::Output
    }

    fn schema(&self) -> serde_json::Value {
        OutputData::schema()
    }

    fn arity(&self) -> Arity {
        Arity::exactly(1)
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn run(
        &self,
        node: &Node,
        inputs: NodeInputs,
    ) -> Result<String> {
        let mut values = inputs.iter();
        let Some((_, value)) = values.next() else {
            return Err(FlowError::MissingInput {
                node_id: node.id.clone(),
            });
        };
        if values.next().is_some() {
            return Err(FlowError::SchemaViolation {
                node_id: node.id.clone(),
                reason: format!("output accepts one upstream value, received {}", inputs.len()),
            });
        }
        Ok(value.to_string())
    }
}
