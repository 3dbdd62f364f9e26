//! The dispatch loop of a single run.
//!
//! Nodes start strictly in plan order. A node starts once all of its
//! producers have completed and fewer than `max_parallelism` nodes are in
//! flight. The first failure or a cancellation aborts every in-flight node.
//!
//! Starting in plan order keeps the recorded start order deterministic at
//! the cost of some overlap: with `max_parallelism > 1`, a ready node waits
//! while an earlier node in the plan is still waiting on its producers.

use std::{collections::HashMap, sync::Arc};

use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

use crate::{
    FlowError, Result, RunError,
    common::Shutdown,
    events::{ErrorReason, GraphEvent, NodeEvent, WorkflowEvent, WorkflowFailedEvent, WorkflowStartEvent},
    executor::{ExecutionPlan, ExecutionResult},
    runtime::ExecutionContext,
    utils,
    workflow::{Workflow, node::NodeId, registry::RunnerRegistry},
};

/// A node handed to its runner and not yet joined.
struct InFlight {
    nid: NodeId,
    terminal: bool,
}

pub(crate) struct Dispatcher<'a> {
    pub(crate) workflow: &'a Workflow,
    pub(crate) plan: &'a ExecutionPlan,
    pub(crate) registry: &'a RunnerRegistry,
    pub(crate) max_parallelism: usize,
    pub(crate) cancel: Arc<Shutdown>,
}

impl Dispatcher<'_> {
    pub(crate) async fn dispatch(
        self,
        mut ctx: ExecutionContext,
    ) -> std::result::Result<ExecutionResult, RunError> {
        let order = self.plan.order();
        info!(nodes = order.len(), "run started");
        ctx.emit(
            "",
            GraphEvent::Workflow(WorkflowEvent::Start(WorkflowStartEvent {
                node_ids: order.to_vec(),
            })),
        );

        let mut tasks: JoinSet<Result<String>> = JoinSet::new();
        let mut in_flight: HashMap<Id, InFlight> = HashMap::new();
        let mut next = 0;

        loop {
            if self.cancel.is_terminated() {
                return Err(Self::cancel_run(ctx, tasks, in_flight));
            }

            while next < order.len() && tasks.len() < self.max_parallelism {
                let nid = &order[next];
                let predecessors = self.plan.predecessors(nid);
                if !predecessors.iter().all(|p| ctx.is_done(p)) {
                    break;
                }
                if let Err(error) = self.launch(&mut ctx, &mut tasks, &mut in_flight, nid, predecessors) {
                    return Err(Self::fail_run(ctx, tasks, in_flight, nid.clone(), error));
                }
                next += 1;
            }

            // every producer precedes its consumer in the plan, so an idle
            // loop means every node has completed
            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                _ = self.cancel.wait() => continue,
                joined = tasks.join_next_with_id() => joined,
            };

            match joined {
                None => break,
                Some(Ok((id, Ok(value)))) => {
                    let Some(done) = in_flight.remove(&id) else {
                        continue;
                    };
                    debug!(node_id = %done.nid, "node succeeded");
                    ctx.emit_node(&done.nid, NodeEvent::Succeeded(utils::time::time_millis()));
                    ctx.add_output(done.nid, value, done.terminal);
                }
                Some(Ok((id, Err(error)))) => {
                    let nid = in_flight.remove(&id).map(|f| f.nid).unwrap_or_default();
                    return Err(Self::fail_run(ctx, tasks, in_flight, nid, error));
                }
                Some(Err(join_error)) => {
                    let nid = in_flight.remove(&join_error.id()).map(|f| f.nid).unwrap_or_default();
                    let error = FlowError::Engine(format!("runner task failed: {join_error}"));
                    return Err(Self::fail_run(ctx, tasks, in_flight, nid, error));
                }
            }
        }

        info!("run succeeded");
        ctx.emit("", GraphEvent::Workflow(WorkflowEvent::Succeeded));

        let run_id = ctx.run_id().to_string();
        let (order, intermediates, outputs) = ctx.into_parts();
        Ok(ExecutionResult {
            run_id,
            order,
            outputs,
            intermediates,
        })
    }

    fn launch(
        &self,
        ctx: &mut ExecutionContext,
        tasks: &mut JoinSet<Result<String>>,
        in_flight: &mut HashMap<Id, InFlight>,
        nid: &NodeId,
        predecessors: &[NodeId],
    ) -> Result<()> {
        let node = self.workflow.node(nid).ok_or_else(|| FlowError::NodeNotFound(nid.clone()))?;
        let kind = node.kind();
        let runner = self.registry.get(&kind).ok_or_else(|| FlowError::SchemaViolation {
            node_id: nid.clone(),
            reason: format!("no runner registered for kind '{kind}'"),
        })?;

        let inputs = ctx.gather(predecessors);
        debug!(node_id = %nid, %kind, inputs = inputs.len(), "node started");
        ctx.mark_started(nid);
        ctx.emit_node(nid, NodeEvent::Running(utils::time::time_millis()));

        let terminal = runner.is_terminal();
        let node = node.clone();
        let handle = tasks.spawn(async move { runner.run(&node, inputs).await });
        in_flight.insert(
            handle.id(),
            InFlight {
                nid: nid.clone(),
                terminal,
            },
        );
        Ok(())
    }

    fn fail_run(
        ctx: ExecutionContext,
        mut tasks: JoinSet<Result<String>>,
        in_flight: HashMap<Id, InFlight>,
        node_id: NodeId,
        error: FlowError,
    ) -> RunError {
        tasks.abort_all();
        Self::stop_in_flight(&ctx, in_flight);

        warn!(node_id = %node_id, %error, "node failed, run aborted");
        ctx.emit_node(&node_id, NodeEvent::Error(ErrorReason::from(&error)));
        ctx.emit(
            "",
            GraphEvent::Workflow(WorkflowEvent::Failed(WorkflowFailedEvent {
                error: format!("node '{node_id}' failed: {error}"),
            })),
        );

        RunError::NodeFailed {
            node_id,
            error,
            partial: ctx.into_partial(),
        }
    }

    fn cancel_run(
        ctx: ExecutionContext,
        mut tasks: JoinSet<Result<String>>,
        in_flight: HashMap<Id, InFlight>,
    ) -> RunError {
        tasks.abort_all();
        Self::stop_in_flight(&ctx, in_flight);

        warn!("run cancelled");
        ctx.emit("", GraphEvent::Workflow(WorkflowEvent::Cancelled));

        RunError::Cancelled {
            partial: ctx.into_partial(),
        }
    }

    fn stop_in_flight(
        ctx: &ExecutionContext,
        in_flight: HashMap<Id, InFlight>,
    ) {
        let mut stopped: Vec<NodeId> = in_flight.into_values().map(|f| f.nid).collect();
        stopped.sort();
        for nid in stopped {
            debug!(node_id = %nid, "node stopped");
            ctx.emit_node(&nid, NodeEvent::Stopped(utils::time::time_millis()));
        }
    }
}
