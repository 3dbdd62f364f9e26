use std::sync::Arc;

use tokio::runtime::{Builder, Handle};

use crate::{
    Config, Engine, FlowError, Result,
    config::BackendType,
    inference::{DisabledBackend, InferenceBackend, OllamaBackend},
    workflow::{registry::RunnerRegistry, runners::Runner},
};

/// Worker threads of the runtime an engine creates for itself.
const OWNED_RUNTIME_WORKERS: usize = 4;

#[derive(Default)]
pub struct EngineBuilder {
    config: Config,
    backend: Option<Arc<dyn InferenceBackend>>,
    runners: Vec<Arc<dyn Runner>>,
    runtime: Option<Handle>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    /// Uses `backend` instead of the one named in the configuration.
    pub fn backend(
        mut self,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Registers an extra runner, replacing a built-in one of the same kind.
    pub fn runner(
        mut self,
        runner: Arc<dyn Runner>,
    ) -> Self {
        self.runners.push(runner);
        self
    }

    /// Runtime for detached runs and event delivery.
    ///
    /// Defaults to the current runtime, or a runtime owned by the engine
    /// when built outside of one.
    pub fn runtime(
        mut self,
        runtime: Handle,
    ) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Engine> {
        if self.config.executor.max_parallelism == 0 {
            return Err(FlowError::Engine("max_parallelism must be at least 1".to_string()));
        }

        let (runtime, owned) = match self.runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => (handle, None),
            None => {
                let runtime = Builder::new_multi_thread()
                    .worker_threads(OWNED_RUNTIME_WORKERS)
                    .enable_all()
                    .build()
                    .map_err(|e| FlowError::Engine(format!("failed to start runtime: {e}")))?;
                (runtime.handle().clone(), Some(Arc::new(runtime)))
            }
        };

        let backend: Arc<dyn InferenceBackend> = match self.backend {
            Some(backend) => backend,
            None => match self.config.inference.backend {
                BackendType::Ollama => Arc::new(OllamaBackend::new(self.config.inference.endpoint.clone())),
                BackendType::None => Arc::new(DisabledBackend),
            },
        };

        let mut registry = RunnerRegistry::builtin(backend, self.config.executor.llm_timeout());
        for runner in self.runners {
            registry.register(runner);
        }

        Ok(Engine::new(&self.config, registry, runtime, owned))
    }
}
