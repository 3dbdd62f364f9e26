//! # MicroFlow
//!
//! MicroFlow is a small workflow graph engine for chaining text inputs,
//! language-model calls and output sinks.
//!
//! ## Core Features
//!
//! - **Typed graph model**: nodes carry a tagged data payload per kind
//! - **Deterministic validation**: Kahn's algorithm with id-ascending tie-breaks
//! - **Portable workflow files**: versioned JSON documents (`.mflow`)
//! - **Extensible runners**: new node kinds plug into the [`RunnerRegistry`]
//! - **Async execution**: powered by `tokio`, with cancellation and inference timeouts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use microflow::{EngineBuilder, EditorSession};
//!
//! let engine = EngineBuilder::new().build()?;
//! let session = EditorSession::new();
//! session.patch_node_data("1", json!({ "text": "Why is the sky blue?" }))?;
//! session.patch_node_data("2", json!({ "modelPath": "qwen2:0.5b" }))?;
//!
//! let snapshot = session.snapshot();
//! let result = engine.execute(&snapshot.workflow).await?;
//! session.record_results(&result)?;
//! ```

mod builder;
mod common;
mod config;
mod engine;
mod error;
mod events;
mod executor;
mod inference;
mod model;
mod runtime;
mod session;
mod utils;
mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::Shutdown;
pub use config::{BackendType, Config, ExecutorConfig, InferenceConfig};
pub use engine::Engine;
pub use error::{FlowError, PartialOutputs, RunError, SerializationError};
pub use events::{ErrorReason, Event, GraphEvent, Message, NodeEvent, RunId, WorkflowEvent, WorkflowFailedEvent, WorkflowStartEvent};
pub use executor::{ExecutionPlan, ExecutionResult, Executor, RunHandle};
pub use inference::{DEFAULT_OLLAMA_ENDPOINT, DisabledBackend, InferenceBackend, InferenceRequest, OllamaBackend};
pub use model::*;
pub use runtime::{Channel, ChannelEvent, ChannelOptions};
pub use session::{EditorSession, Snapshot};
pub use workflow::{
    Workflow,
    edge::{Edge, EdgeId},
    node::{DEFAULT_TEMPERATURE, InputData, LlmData, Node, NodeData, NodeId, NodeKind, OutputData, Position, TEMPERATURE_RANGE},
    registry::RunnerRegistry,
    runners::{Arity, INPUT_SEPARATOR, InputRunner, LlmRunner, NodeInputs, OutputRunner, Runner},
    serializer::{export, import, import_bytes},
    validator::{detect_cycles, validate, validate_with},
};

/// Result type alias for MicroFlow operations.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
