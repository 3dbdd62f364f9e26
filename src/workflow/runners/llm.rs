use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    FlowError, Result,
    inference::{InferenceBackend, InferenceRequest},
    workflow::node::{LlmData, Node, NodeData, NodeKind},
};

use super::{NodeInputs, Runner};

/// Concatenates upstream text into a prompt and asks the inference backend to complete it.
pub struct LlmRunner {
    backend: Arc<dyn InferenceBackend>,
    /// default timeout; `None` waits indefinitely
    timeout: Option<Duration>,
}

impl LlmRunner {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            timeout: None,
        }
    }

    pub fn with_timeout(
        mut self,
        timeout: Option<Duration>,
    ) -> Self {
        self.timeout = timeout;
        self
    }

    /// Effective timeout for `data`. A per-node `timeoutMs` of 0 disables it.
    fn timeout_for(
        &self,
        data: &LlmData,
    ) -> Option<Duration> {
        match data.timeout_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => self.timeout,
        }
    }
}

#[async_trait]
impl Runner for LlmRunner {
    fn kind(&self) -> NodeKind {
        NodeKind::Llm
    }

    fn schema(&self) -> serde_json::Value {
        LlmData::schema()
    }

    async fn run(
        &self,
        node: &Node,
        inputs: NodeInputs,
    ) -> Result<String> {
        let NodeData::Llm(data) = &node.data else {
            return Err(FlowError::SchemaViolation {
                node_id: node.id.clone(),
                reason: format!("llm runner cannot execute a '{}' node", node.kind()),
            });
        };

        let request = InferenceRequest {
            model: data.model_path.clone(),
            temperature: data.temperature,
            prompt: inputs.concat(),
            params: data.params.clone(),
        };
        debug!(node_id = %node.id, backend = self.backend.name(), model = %request.model, prompt_len = request.prompt.len(), "invoking inference");

        match self.timeout_for(data) {
            Some(limit) => tokio::time::timeout(limit, self.backend.generate(request)).await.map_err(|_| FlowError::InferenceTimeout(limit))?,
            None => self.backend.generate(request).await,
        }
    }
}
