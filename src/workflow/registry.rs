//! Maps node kinds to the runners that execute them.

use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{
    inference::InferenceBackend,
    workflow::{
        node::NodeKind,
        runners::{InputRunner, LlmRunner, OutputRunner, Runner},
    },
};

/// Kind → runner table consulted by the validator and the executor.
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn Runner>>,
}

impl RunnerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `input`, `llm` and `output` runners.
    pub fn builtin(
        backend: Arc<dyn InferenceBackend>,
        llm_timeout: Option<Duration>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InputRunner));
        registry.register(Arc::new(LlmRunner::new(backend).with_timeout(llm_timeout)));
        registry.register(Arc::new(OutputRunner));
        registry
    }

    /// Registers `runner` for its kind, returning the runner it replaces.
    pub fn register(
        &mut self,
        runner: Arc<dyn Runner>,
    ) -> Option<Arc<dyn Runner>> {
        self.runners.insert(runner.kind().as_str().to_string(), runner)
    }

    pub fn get(
        &self,
        kind: &NodeKind,
    ) -> Option<Arc<dyn Runner>> {
        self.runners.get(kind.as_str()).cloned()
    }

    pub fn contains(
        &self,
        kind: &NodeKind,
    ) -> bool {
        self.runners.contains_key(kind.as_str())
    }

    /// registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.runners.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
