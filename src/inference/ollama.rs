//! Ollama backend.
//!
//! Talks to an Ollama daemon over its `/api/generate` endpoint with
//! streaming disabled, and maps HTTP failures onto the engine's error kinds.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{FlowError, Result};

use super::{InferenceBackend, InferenceRequest};

/// Default address of a local Ollama daemon.
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://127.0.0.1:11434";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Inference over HTTP against an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    http_client: reqwest::Client,
    base_url: String,
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_ENDPOINT)
    }
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(request: &InferenceRequest) -> serde_json::Value {
        let mut options = serde_json::Map::new();
        options.insert("temperature".to_string(), json!(request.temperature));
        for (key, value) in request.params.iter() {
            options.insert(key.clone(), value.clone());
        }

        json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": options,
        })
    }

    /// Maps a non-success response onto the engine's failure kinds.
    fn classify(
        model: &str,
        status: StatusCode,
        body: &str,
    ) -> FlowError {
        let message = serde_json::from_str::<ErrorResponse>(body).map(|e| e.error).unwrap_or_else(|_| body.to_string());
        let lowered = message.to_lowercase();

        if status == StatusCode::NOT_FOUND || lowered.contains("not found") {
            FlowError::ModelNotFound {
                model: model.to_string(),
                message,
            }
        } else if status == StatusCode::INSUFFICIENT_STORAGE || lowered.contains("out of memory") || lowered.contains("requires more system memory") {
            FlowError::InsufficientResources(message)
        } else {
            FlowError::InferenceFailure(format!("Ollama API error ({}): {}", status, message))
        }
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        request: InferenceRequest,
    ) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(url = %url, model = %request.model, "sending generate request");

        let response = self
            .http_client
            .post(&url)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(|e| FlowError::InferenceFailure(format!("failed to reach Ollama at {}: {}", self.base_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify(&request.model, status, &body));
        }

        let data: GenerateResponse = response.json().await.map_err(|e| FlowError::InferenceFailure(format!("failed to parse Ollama response: {}", e)))?;
        Ok(data.response)
    }
}
