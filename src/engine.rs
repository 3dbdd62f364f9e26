//! The engine: command surface for an editor collaborator.
//!
//! Every command validates at the boundary it guards: saving and running
//! reject invalid graphs, loading does not.

use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

use crate::{
    ChannelEvent, ChannelOptions, Config, Result, RunError,
    executor::{ExecutionResult, Executor, RunHandle},
    runtime::Channel,
    workflow::{
        Workflow,
        edge::Edge,
        node::{Node, NodeId},
        registry::RunnerRegistry,
        serializer, validator,
    },
};

/// The main workflow engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().config(Config::create("microflow.toml")?).build()?;
///
/// let workflow = engine.load_workflow(&document)?;
/// let result = engine.execute(&workflow).await?;
/// println!("{}", result.text().unwrap_or_default());
/// ```
pub struct Engine {
    executor: Executor,
    channel: Arc<Channel>,
    runtime: Handle,
    /// set when the engine had to start its own runtime
    _owned_runtime: Option<Arc<Runtime>>,
}

impl Engine {
    pub(crate) fn new(
        config: &Config,
        registry: RunnerRegistry,
        runtime: Handle,
        owned_runtime: Option<Arc<Runtime>>,
    ) -> Self {
        let channel = Arc::new(Channel::new(runtime.clone()));
        channel.listen();

        let executor = Executor::new(Arc::new(registry), channel.clone()).with_max_parallelism(config.executor.max_parallelism);
        info!(kinds = ?executor.registry().kinds(), max_parallelism = config.executor.max_parallelism, "engine started");

        Self {
            executor,
            channel,
            runtime,
            _owned_runtime: owned_runtime,
        }
    }

    /// Checks a bare edge list for cycles.
    pub fn detect_cycles(
        &self,
        edges: &[(String, String)],
    ) -> Result<()> {
        validator::detect_cycles(edges)
    }

    /// Validates `workflow` against the registered runners and returns its execution order.
    pub fn validate(
        &self,
        workflow: &Workflow,
    ) -> Result<Vec<NodeId>> {
        validator::validate_with(workflow, &self.executor.registry())
    }

    /// Builds a graph from `nodes` and `edges`, validates it and serializes it.
    pub fn save_workflow(
        &self,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<String> {
        self.save(&Workflow::from_parts(nodes, edges)?)
    }

    /// Validates and serializes `workflow`.
    pub fn save(
        &self,
        workflow: &Workflow,
    ) -> Result<String> {
        self.validate(workflow)?;
        debug!(summary = %workflow.summary(), "saving workflow");
        serializer::export(workflow)
    }

    /// Parses a workflow document. The result is not validated.
    pub fn load_workflow(
        &self,
        document: &str,
    ) -> Result<Workflow> {
        let workflow = serializer::import(document)?;
        debug!(nodes = workflow.node_count(), edges = workflow.edge_count(), "workflow loaded");
        Ok(workflow)
    }

    /// Runs `workflow` to completion.
    pub async fn execute(
        &self,
        workflow: &Workflow,
    ) -> std::result::Result<ExecutionResult, RunError> {
        self.executor.run(workflow).await
    }

    /// Loads and runs a workflow document, returning its terminal text.
    ///
    /// With one terminal node the text is that node's value. Otherwise it
    /// is a JSON object of terminal values keyed by node id, so a graph
    /// without any `output` node runs every node and yields `"{}"`.
    pub async fn execute_workflow(
        &self,
        document: &str,
    ) -> std::result::Result<String, RunError> {
        let workflow = self.load_workflow(document).map_err(RunError::Invalid)?;
        let result = self.execute(&workflow).await?;
        match result.text() {
            Some(text) => Ok(text.to_string()),
            None => serde_json::to_string(&result.outputs).map_err(|e| RunError::Invalid(e.into())),
        }
    }

    /// Starts a detached run on a copy of `workflow`.
    pub fn spawn(
        &self,
        workflow: Workflow,
    ) -> RunHandle {
        self.executor.spawn(&self.runtime, workflow)
    }

    pub fn registry(&self) -> Arc<RunnerRegistry> {
        self.executor.registry()
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    /// Subscribes to run events matching `options`.
    pub fn subscribe(
        &self,
        options: ChannelOptions,
    ) -> Result<ChannelEvent> {
        ChannelEvent::channel(self.channel.clone(), options)
    }

    /// Stops event delivery. Runs already in flight are unaffected.
    pub fn shutdown(&self) {
        self.channel.shutdown();
    }
}
