use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use microflow::{
    BackendType, ChannelOptions, Config, Edge, EditorSession, EngineBuilder, FlowError, GraphEvent, InferenceBackend, InferenceRequest, Node, NodeEvent,
    NodeInputs, NodeKind, Result, RunError, Runner, SerializationError, Workflow,
};
use serde_json::json;
use tokio::sync::mpsc;

/// Echoes the prompt after an optional delay and counts calls.
#[derive(Default)]
struct StubBackend {
    calls: AtomicUsize,
    delay: Duration,
}

impl StubBackend {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl InferenceBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(
        &self,
        request: InferenceRequest,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(format!("echo({})", request.prompt))
    }
}

fn chain() -> Workflow {
    Workflow::from_parts(
        vec![Node::input("A", "hi"), Node::llm("B", "qwen2:0.5b"), Node::output("C")],
        vec![Edge::new("e1", "A", "B"), Edge::new("e2", "B", "C")],
    )
    .unwrap()
}

#[tokio::test]
async fn test_linear_chain_runs_in_order() {
    let backend = Arc::new(StubBackend::default());
    let engine = EngineBuilder::new().backend(backend.clone()).build().unwrap();

    let result = engine.execute(&chain()).await.unwrap();
    assert_eq!(result.order, vec!["A", "B", "C"]);
    assert_eq!(result.outputs["C"], "echo(hi)");
    assert_eq!(result.text(), Some("echo(hi)"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cycle_never_runs() {
    let backend = Arc::new(StubBackend::default());
    let engine = EngineBuilder::new().backend(backend.clone()).build().unwrap();
    let wf = Workflow::from_parts(
        vec![Node::input("A", "hi"), Node::llm("B", "qwen2:0.5b")],
        vec![Edge::new("e1", "A", "B"), Edge::new("e2", "B", "A")],
    )
    .unwrap();

    let Err(FlowError::CycleDetected {
        nodes,
    }) = engine.validate(&wf)
    else {
        panic!("cycle not detected");
    };
    assert!(nodes.contains(&"A".to_string()) || nodes.contains(&"B".to_string()));

    // cyclic graphs still load and export
    let document = microflow::export(&wf).unwrap();
    let err = engine.execute_workflow(&document).await.unwrap_err();
    assert!(matches!(err, RunError::Invalid(FlowError::CycleDetected { .. })));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

    assert!(engine.detect_cycles(&[("A".into(), "B".into()), ("B".into(), "A".into())]).is_err());
    assert!(engine.detect_cycles(&[("A".into(), "B".into())]).is_ok());
}

#[tokio::test]
async fn test_dangling_edge_names_missing_node() {
    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    let wf = Workflow::from_parts(vec![Node::input("A", "hi"), Node::output("C")], vec![Edge::new("e1", "A", "C"), Edge::new("e2", "A", "Z")]).unwrap();

    assert_eq!(
        engine.validate(&wf).unwrap_err(),
        FlowError::DanglingEdge {
            edge_id: "e2".into(),
            node_id: "Z".into()
        }
    );
}

#[tokio::test]
async fn test_unfed_output_rejected_before_running() {
    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    let wf = Workflow::from_parts(vec![Node::input("A", "hi"), Node::output("C")], vec![]).unwrap();

    let err = engine.execute(&wf).await.unwrap_err();
    assert!(matches!(err, RunError::Invalid(FlowError::SchemaViolation { ref node_id, .. }) if node_id == "C"));
    assert!(err.partial().is_none());
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let engine = EngineBuilder::new()
        .backend(Arc::new(StubBackend::default()))
        .config(Config::load_from_str("[executor]\nmax_parallelism = 3").unwrap())
        .build()
        .unwrap();
    let wf = Workflow::from_parts(
        vec![Node::input("q", "question"), Node::input("c", "context"), Node::llm("m1", "a"), Node::llm("m2", "b"), Node::llm("j", "c"), Node::output("out")],
        vec![
            Edge::new("e1", "q", "m1"),
            Edge::new("e2", "c", "m1"),
            Edge::new("e3", "c", "m2"),
            Edge::new("e4", "m2", "j"),
            Edge::new("e5", "m1", "j"),
            Edge::new("e6", "j", "out"),
        ],
    )
    .unwrap();

    let first = engine.execute(&wf).await.unwrap();
    let second = engine.execute(&wf).await.unwrap();
    assert_eq!(first.order, second.order);
    assert_eq!(first.outputs, second.outputs);
    assert_eq!(first.intermediates, second.intermediates);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.order, vec!["c", "m2", "q", "m1", "j", "out"]);
    assert_eq!(first.outputs["out"], "echo(echo(context)\necho(context\nquestion))");
}

#[tokio::test]
async fn test_save_load_round_trip() {
    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    let wf = chain();
    let document = engine.save_workflow(wf.nodes().cloned().collect(), wf.edges().to_vec()).unwrap();
    assert_eq!(engine.load_workflow(&document).unwrap(), wf);
    assert_eq!(engine.execute_workflow(&document).await.unwrap(), "echo(hi)");
}

#[tokio::test]
async fn test_save_blocked_on_invalid_graph() {
    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    // the seed graph has no model configured yet
    assert!(matches!(engine.save(&Workflow::seed()), Err(FlowError::SchemaViolation { ref node_id, .. }) if node_id == "2"));
}

#[tokio::test]
async fn test_load_rejects_unknown_version() {
    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    let err = engine.execute_workflow(r#"{ "version": "2.0", "nodes": [], "edges": [] }"#).await.unwrap_err();
    assert_eq!(err, RunError::Invalid(FlowError::Serialization(SerializationError::UnsupportedVersion(Some("2.0".into())))));
}

#[tokio::test]
async fn test_multiple_outputs_are_keyed() {
    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    let wf = Workflow::from_parts(
        vec![Node::input("A", "hi"), Node::llm("B", "m"), Node::output("O1"), Node::output("O2")],
        vec![Edge::new("e1", "A", "B"), Edge::new("e2", "B", "O1"), Edge::new("e3", "A", "O2")],
    )
    .unwrap();
    let text = engine.execute_workflow(&microflow::export(&wf).unwrap()).await.unwrap();
    let outputs: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(outputs, json!({ "O1": "echo(hi)", "O2": "hi" }));
}

#[tokio::test]
async fn test_graph_without_output_yields_empty_object() {
    let backend = Arc::new(StubBackend::default());
    let engine = EngineBuilder::new().backend(backend.clone()).build().unwrap();
    let wf = Workflow::from_parts(vec![Node::input("A", "hi"), Node::llm("B", "m")], vec![Edge::new("e1", "A", "B")]).unwrap();
    assert_eq!(engine.execute_workflow(&microflow::export(&wf).unwrap()).await.unwrap(), "{}");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_runs_documents_with_label_only_inputs() {
    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    let document = r#"{
        "version": "1.0",
        "nodes": [
            { "id": "1", "type": "input", "position": { "x": 100, "y": 100 }, "data": { "label": "文本输入" } },
            { "id": "2", "type": "llm", "position": { "x": 300, "y": 100 }, "data": { "label": "LLM模型", "modelPath": "qwen2", "temperature": 0.7 } },
            { "id": "3", "type": "output", "position": { "x": 500, "y": 100 }, "data": { "label": "输出结果" } }
        ],
        "edges": [
            { "id": "e1-2", "source": "1", "target": "2" },
            { "id": "e2-3", "source": "2", "target": "3" }
        ]
    }"#;
    assert_eq!(engine.execute_workflow(document).await.unwrap(), "echo(文本输入)");
}

#[tokio::test]
async fn test_disabled_backend_reports_model_not_found() {
    let mut config = Config::default();
    config.inference.backend = BackendType::None;
    let engine = EngineBuilder::new().config(config).build().unwrap();

    let err = engine.execute(&chain()).await.unwrap_err();
    let RunError::NodeFailed {
        node_id,
        error,
        partial,
    } = err
    else {
        panic!("run did not fail at a node");
    };
    assert_eq!(node_id, "B");
    assert!(matches!(error, FlowError::ModelNotFound { ref model, .. } if model == "qwen2:0.5b"));
    assert_eq!(partial.get("A").map(String::as_str), Some("hi"));
    assert!(!partial.contains_key("C"));
}

#[tokio::test(start_paused = true)]
async fn test_llm_timeout_from_config() {
    let engine = EngineBuilder::new()
        .config(Config::load_from_str("[executor]\nllm_timeout_ms = 5000").unwrap())
        .backend(Arc::new(StubBackend::slow(Duration::from_secs(60))))
        .build()
        .unwrap();

    let err = engine.execute(&chain()).await.unwrap_err();
    assert_eq!(err.error(), FlowError::InferenceTimeout(Duration::from_secs(5)));
    assert!(err.error().is_inference_failure());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_detached_run() {
    let backend = Arc::new(StubBackend::slow(Duration::from_secs(60)));
    let engine = EngineBuilder::new().backend(backend.clone()).build().unwrap();

    let handle = engine.spawn(chain());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    handle.cancel();

    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.error(), FlowError::Cancelled);
    assert_eq!(err.partial().map(|p| p.len()), Some(1));
}

#[tokio::test]
async fn test_events_follow_the_run() {
    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.subscribe(ChannelOptions::default()).unwrap().on_event(move |e| {
        let _ = tx.send((e.nid.clone(), e.event.clone()));
    });

    let result = engine.execute(&chain()).await.unwrap();

    let mut running = Vec::new();
    loop {
        let (nid, event) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        if let GraphEvent::Node(NodeEvent::Running(_)) = event {
            running.push(nid);
        } else if event.is_final() {
            assert!(event.is_complete());
            break;
        }
    }
    assert_eq!(running, result.order);
}

struct Shout;

#[async_trait]
impl Runner for Shout {
    fn kind(&self) -> NodeKind {
        NodeKind::parse("shout")
    }

    async fn run(
        &self,
        _: &Node,
        inputs: NodeInputs,
    ) -> Result<String> {
        Ok(inputs.concat().to_uppercase())
    }
}

#[tokio::test]
async fn test_extension_kind() {
    let document = r#"{
        "version": "1.0",
        "nodes": [
            { "id": "1", "type": "input", "position": { "x": 0, "y": 0 }, "data": { "text": "quiet" } },
            { "id": "2", "type": "shout", "position": { "x": 1, "y": 0 }, "data": {} },
            { "id": "3", "type": "output", "position": { "x": 2, "y": 0 }, "data": {} }
        ],
        "edges": [
            { "id": "e1-2", "source": "1", "target": "2" },
            { "id": "e2-3", "source": "2", "target": "3" }
        ]
    }"#;

    let plain = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    assert!(matches!(plain.execute_workflow(document).await, Err(RunError::Invalid(FlowError::SchemaViolation { .. }))));

    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).runner(Arc::new(Shout)).build().unwrap();
    assert_eq!(engine.execute_workflow(document).await.unwrap(), "QUIET");
}

#[tokio::test]
async fn test_editor_session_flow() {
    let engine = EngineBuilder::new().backend(Arc::new(StubBackend::default())).build().unwrap();
    let session = EditorSession::new();
    session.patch_node_data("1", json!({ "text": "hello" })).unwrap();
    session.patch_node_data("2", json!({ "modelPath": "qwen2:0.5b", "temperature": 0.2 })).unwrap();

    let snapshot = session.snapshot();
    let run = engine.spawn(snapshot.workflow.as_ref().clone());
    // edits after the snapshot do not reach the run
    session.patch_node_data("1", json!({ "text": "changed" })).unwrap();

    let result = run.wait().await.unwrap();
    assert_eq!(result.text(), Some("echo(hello)"));
    session.record_results(&result).unwrap();

    let document = engine.save(&session.snapshot().workflow).unwrap();
    let reloaded = engine.load_workflow(&document).unwrap();
    assert_eq!(reloaded.node("3").map(|n| n.data.clone()), session.snapshot().workflow.node("3").map(|n| n.data.clone()));
    assert!(session.snapshot().generation > snapshot.generation);
}
