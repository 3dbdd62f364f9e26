//! Runs validated workflows.
//!
//! A run validates the graph against the runner registry, derives an
//! [`ExecutionPlan`] from the topological order and then hands the plan to
//! the dispatch loop, which starts nodes strictly in plan order.

mod dispatcher;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use tokio::task::JoinHandle;
use tracing::{Instrument, info_span, warn};

use crate::{
    FlowError, Result, RunError,
    common::Shutdown,
    error::PartialOutputs,
    events::{GraphEvent, RunId, WorkflowEvent, WorkflowFailedEvent},
    runtime::{Channel, ExecutionContext},
    utils,
    workflow::{Workflow, node::NodeId, registry::RunnerRegistry, validator},
};

use dispatcher::Dispatcher;

/// Topological order plus the distinct producers of every node.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    order: Vec<NodeId>,
    predecessors: HashMap<NodeId, Vec<NodeId>>,
}

impl ExecutionPlan {
    /// Builds the plan for `workflow` given its topological `order`.
    ///
    /// Each node's producers are deduplicated and sorted by their position
    /// in `order`, which fixes the concatenation order of fan-in inputs.
    pub fn new(
        workflow: &Workflow,
        order: Vec<NodeId>,
    ) -> Self {
        let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, nid)| (nid.as_str(), i)).collect();
        let predecessors = order
            .iter()
            .map(|nid| {
                let mut producers: Vec<NodeId> = workflow.incoming(nid).map(|e| e.source.clone()).collect();
                producers.sort_by_key(|p| position.get(p.as_str()).copied().unwrap_or(usize::MAX));
                producers.dedup();
                (nid.clone(), producers)
            })
            .collect();

        Self {
            order,
            predecessors,
        }
    }

    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn predecessors(
        &self,
        nid: &str,
    ) -> &[NodeId] {
        self.predecessors.get(nid).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub run_id: RunId,
    /// nodes in the order they were started
    pub order: Vec<NodeId>,
    /// values of the terminal nodes, keyed by node id
    pub outputs: BTreeMap<NodeId, String>,
    /// every node's value
    pub intermediates: PartialOutputs,
}

impl ExecutionResult {
    /// The terminal value when the graph has exactly one terminal node.
    pub fn text(&self) -> Option<&str> {
        match self.outputs.len() {
            1 => self.outputs.values().next().map(String::as_str),
            _ => None,
        }
    }
}

/// Validates and runs workflows against a runner registry.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<RunnerRegistry>,
    channel: Arc<Channel>,
    max_parallelism: usize,
}

impl Executor {
    pub fn new(
        registry: Arc<RunnerRegistry>,
        channel: Arc<Channel>,
    ) -> Self {
        Self {
            registry,
            channel,
            max_parallelism: 1,
        }
    }

    /// Upper bound on nodes running at once. Values below 1 are raised to 1.
    pub fn with_max_parallelism(
        mut self,
        n: usize,
    ) -> Self {
        self.max_parallelism = n.max(1);
        self
    }

    pub fn registry(&self) -> Arc<RunnerRegistry> {
        self.registry.clone()
    }

    /// Validates `workflow` and derives its plan without running anything.
    pub fn plan(
        &self,
        workflow: &Workflow,
    ) -> Result<ExecutionPlan> {
        let order = validator::validate_with(workflow, &self.registry)?;
        Ok(ExecutionPlan::new(workflow, order))
    }

    /// Runs `workflow` to completion under a fresh run id.
    pub async fn run(
        &self,
        workflow: &Workflow,
    ) -> std::result::Result<ExecutionResult, RunError> {
        self.run_with(utils::longid(), workflow, Arc::new(Shutdown::new())).await
    }

    /// Runs `workflow` as `run_id`, stopping early once `cancel` fires.
    pub async fn run_with(
        &self,
        run_id: RunId,
        workflow: &Workflow,
        cancel: Arc<Shutdown>,
    ) -> std::result::Result<ExecutionResult, RunError> {
        let span = info_span!("run", run_id = %run_id);
        async move {
            let ctx = ExecutionContext::new(run_id, self.channel.clone());

            let plan = match self.plan(workflow) {
                Ok(plan) => plan,
                Err(error) => {
                    warn!(%error, "workflow rejected");
                    ctx.emit(
                        "",
                        GraphEvent::Workflow(WorkflowEvent::Failed(WorkflowFailedEvent {
                            error: error.to_string(),
                        })),
                    );
                    return Err(RunError::Invalid(error));
                }
            };

            Dispatcher {
                workflow,
                plan: &plan,
                registry: &self.registry,
                max_parallelism: self.max_parallelism,
                cancel,
            }
            .dispatch(ctx)
            .await
        }
        .instrument(span)
        .await
    }

    /// Starts a run of `workflow` on `runtime` and returns immediately.
    ///
    /// The run operates on its own copy of the graph.
    pub fn spawn(
        &self,
        runtime: &tokio::runtime::Handle,
        workflow: Workflow,
    ) -> RunHandle {
        let run_id = utils::longid();
        let cancel = Arc::new(Shutdown::new());
        let executor = self.clone();
        let join = {
            let run_id = run_id.clone();
            let cancel = cancel.clone();
            runtime.spawn(async move { executor.run_with(run_id, &workflow, cancel).await })
        };

        RunHandle {
            run_id,
            cancel,
            join,
        }
    }
}

/// A detached run.
pub struct RunHandle {
    run_id: RunId,
    cancel: Arc<Shutdown>,
    join: JoinHandle<std::result::Result<ExecutionResult, RunError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Requests cancellation. The running node is interrupted and no
    /// further node starts.
    pub fn cancel(&self) {
        self.cancel.shutdown();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the run's outcome.
    pub async fn wait(self) -> std::result::Result<ExecutionResult, RunError> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(RunError::Cancelled {
                partial: PartialOutputs::new(),
            }),
            Err(e) => Err(RunError::Invalid(FlowError::Engine(format!("run task failed: {e}")))),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::runtime::Handle;

    use super::*;
    use crate::{
        inference::{InferenceBackend, InferenceRequest},
        workflow::{
            edge::Edge,
            node::{Node, NodeKind},
            runners::{NodeInputs, Runner},
        },
    };

    /// Answers with the prompt in brackets after an optional delay.
    struct Bracket {
        delay: Duration,
    }

    #[async_trait]
    impl InferenceBackend for Bracket {
        fn name(&self) -> &str {
            "bracket"
        }

        async fn generate(
            &self,
            request: InferenceRequest,
        ) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok(format!("[{}]", request.prompt))
        }
    }

    struct Fails;

    #[async_trait]
    impl Runner for Fails {
        fn kind(&self) -> NodeKind {
            NodeKind::parse("fails")
        }

        async fn run(
            &self,
            node: &Node,
            _: NodeInputs,
        ) -> Result<String> {
            Err(FlowError::InferenceFailure(format!("{} broke", node.id)))
        }
    }

    fn executor(delay: Duration) -> Executor {
        let mut registry = RunnerRegistry::builtin(Arc::new(Bracket { delay }), None);
        registry.register(Arc::new(Fails));
        Executor::new(Arc::new(registry), Arc::new(Channel::new(Handle::current())))
    }

    fn chain() -> Workflow {
        Workflow::from_parts(
            vec![Node::input("A", "hi"), Node::llm("B", "qwen2"), Node::output("C")],
            vec![Edge::new("e1", "A", "B"), Edge::new("e2", "B", "C")],
        )
        .unwrap()
    }

    #[test]
    fn test_plan_dedups_producers_in_order() {
        let wf = Workflow::from_parts(
            vec![Node::input("z", "1"), Node::input("a", "2"), Node::llm("m", "qwen2")],
            vec![Edge::new("e1", "z", "m"), Edge::new("e2", "a", "m"), Edge::new("e3", "z", "m")],
        )
        .unwrap();
        let plan = ExecutionPlan::new(&wf, vec!["a".into(), "z".into(), "m".into()]);
        assert_eq!(plan.predecessors("m"), ["a".to_string(), "z".to_string()]);
        assert!(plan.predecessors("a").is_empty());
        assert!(plan.predecessors("unknown").is_empty());
        assert_eq!(plan.len(), 3);
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let result = executor(Duration::ZERO).run(&chain()).await.unwrap();
        assert_eq!(result.order, vec!["A", "B", "C"]);
        assert_eq!(result.text(), Some("[hi]"));
        assert_eq!(result.intermediates["B"], "[hi]");
    }

    #[tokio::test]
    async fn test_fan_in_concatenates_by_order() {
        let wf = Workflow::from_parts(
            vec![Node::input("b", "second"), Node::input("a", "first"), Node::llm("m", "qwen2"), Node::output("o")],
            vec![Edge::new("e1", "b", "m"), Edge::new("e2", "a", "m"), Edge::new("e3", "m", "o")],
        )
        .unwrap();
        let result = executor(Duration::ZERO).run(&wf).await.unwrap();
        assert_eq!(result.order, vec!["a", "b", "m", "o"]);
        assert_eq!(result.outputs["o"], "[first\nsecond]");
    }

    #[tokio::test]
    async fn test_multiple_outputs_keyed_by_id() {
        let wf = Workflow::from_parts(
            vec![Node::input("A", "x"), Node::output("O1"), Node::output("O2")],
            vec![Edge::new("e1", "A", "O1"), Edge::new("e2", "A", "O2")],
        )
        .unwrap();
        let result = executor(Duration::ZERO).run(&wf).await.unwrap();
        assert_eq!(result.outputs.len(), 2);
        assert_eq!(result.text(), None);
        assert_eq!(result.outputs["O2"], "x");
    }

    #[tokio::test]
    async fn test_failure_stops_run_with_partial_outputs() {
        let wf = Workflow::from_parts(
            vec![Node::input("A", "x"), Node::new("B", crate::workflow::node::NodeData::Other {
                kind: "fails".into(),
                data: serde_json::json!({}),
            }), Node::output("C")],
            vec![Edge::new("e1", "A", "B"), Edge::new("e2", "B", "C")],
        )
        .unwrap();
        let err = executor(Duration::ZERO).run(&wf).await.unwrap_err();
        let RunError::NodeFailed {
            node_id,
            error,
            partial,
        } = err
        else {
            panic!("unexpected outcome");
        };
        assert_eq!(node_id, "B");
        assert!(error.is_inference_failure());
        assert_eq!(partial.keys().collect::<Vec<_>>(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_invalid_graph_never_runs() {
        let wf = Workflow::from_parts(
            vec![Node::input("A", "x"), Node::llm("B", "qwen2")],
            vec![Edge::new("e1", "A", "B"), Edge::new("e2", "B", "A")],
        )
        .unwrap();
        let err = executor(Duration::ZERO).run(&wf).await.unwrap_err();
        assert!(matches!(err, RunError::Invalid(FlowError::CycleDetected { .. })));
        assert!(err.partial().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_running_node() {
        let handle = executor(Duration::from_secs(60)).spawn(&Handle::current(), chain());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.is_finished());
        handle.cancel();

        let err = handle.wait().await.unwrap_err();
        let RunError::Cancelled {
            partial,
        } = err
        else {
            panic!("unexpected outcome");
        };
        assert_eq!(partial.len(), 1);
        assert_eq!(partial["A"], "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_branches() {
        let wf = Workflow::from_parts(
            vec![Node::input("A", "x"), Node::llm("L", "qwen2"), Node::llm("R", "qwen2"), Node::llm("J", "qwen2"), Node::output("O")],
            vec![Edge::new("e1", "A", "L"), Edge::new("e2", "A", "R"), Edge::new("e3", "L", "J"), Edge::new("e4", "R", "J"), Edge::new("e5", "J", "O")],
        )
        .unwrap();
        let started = tokio::time::Instant::now();
        let result = executor(Duration::from_secs(10)).with_max_parallelism(2).run(&wf).await.unwrap();
        // L and R overlap, so three sequential llm calls would take 30s
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(result.order, vec!["A", "L", "R", "J", "O"]);
        assert_eq!(result.text(), Some("[[x]\n[x]]"));
    }
}
