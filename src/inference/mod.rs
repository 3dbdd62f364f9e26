//! The inference capability llm nodes call into.
//!
//! The engine only knows the request shape and the failure taxonomy; how a
//! model is loaded and sampled is up to the [`InferenceBackend`]
//! implementation.

mod ollama;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{FlowError, Result};

pub use ollama::{DEFAULT_OLLAMA_ENDPOINT, OllamaBackend};

/// One generation request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    /// model path or identifier
    pub model: String,
    pub temperature: f64,
    pub prompt: String,
    /// extra generation parameters, passed through untouched
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// An external text-generation capability.
///
/// Implementations report failures with [`FlowError::ModelNotFound`],
/// [`FlowError::InsufficientResources`] or [`FlowError::InferenceFailure`],
/// carrying the backend's diagnostic message.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Generates text for `request`.
    async fn generate(
        &self,
        request: InferenceRequest,
    ) -> Result<String>;
}

/// Backend used when inference is disabled in the configuration.
///
/// Every model reference is unresolvable.
#[derive(Debug, Clone, Default)]
pub struct DisabledBackend;

#[async_trait]
impl InferenceBackend for DisabledBackend {
    fn name(&self) -> &str {
        "none"
    }

    async fn generate(
        &self,
        request: InferenceRequest,
    ) -> Result<String> {
        Err(FlowError::ModelNotFound {
            model: request.model,
            message: "inference backend is disabled".to_string(),
        })
    }
}
