//! Workflow nodes and their per-kind configuration.
//!
//! A node's `data` is a tagged variant: each built-in kind carries its own
//! strongly typed field set, and kinds contributed by extension runners keep
//! their raw JSON payload.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{FlowError, Result};

/// node id
pub type NodeId = String;

/// Default sampling temperature for new llm nodes.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Accepted temperature range, inclusive.
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);

/// The kind tag of a node.
///
/// Unknown tags parse into [`NodeKind::Other`] so graphs using kinds from
/// extension runners can be loaded and dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    Input,
    Llm,
    Output,
    #[strum(default)]
    Other(String),
}

impl NodeKind {
    /// Parses a kind tag. Unknown tags become [`NodeKind::Other`].
    pub fn parse(s: &str) -> Self {
        // the default variant makes parsing infallible
        NodeKind::from_str(s).unwrap_or_else(|_| NodeKind::Other(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Llm => "llm",
            NodeKind::Output => "output",
            NodeKind::Other(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas position. Opaque to the engine, carried for round-tripping.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            x,
            y,
        }
    }

    /// JSON has no encoding for NaN or infinities.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Configuration of an `input` node: the literal text it emits.
///
/// Documents written by older editors keep the text in `label` only; it is
/// used as the text when `text` is absent.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", from = "InputDataModel")]
pub struct InputData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub text: String,
}

impl InputData {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            label: None,
            text: text.into(),
        }
    }

    pub fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "anyOf": [
                { "required": ["text"] },
                { "required": ["label"] }
            ],
            "properties": {
                "label": { "type": "string" },
                "text": { "type": "string", "description": "Literal text emitted by the node" }
            }
        })
    }
}

#[derive(Deserialize)]
struct InputDataModel {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl From<InputDataModel> for InputData {
    fn from(model: InputDataModel) -> Self {
        let text = model.text.or_else(|| model.label.clone()).unwrap_or_default();
        Self {
            label: model.label,
            text,
        }
    }
}

/// Configuration of an `llm` node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Model path or identifier handed to the inference backend.
    #[serde(alias = "modelId", alias = "model")]
    pub model_path: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Extra generation parameters passed through to the backend untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
    /// Per-node inference timeout in milliseconds, overriding the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl Default for LlmData {
    fn default() -> Self {
        Self {
            label: None,
            model_path: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            params: BTreeMap::new(),
            timeout_ms: None,
        }
    }
}

impl LlmData {
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(
        mut self,
        temperature: f64,
    ) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "anyOf": [
                { "required": ["modelPath"] },
                { "required": ["modelId"] },
                { "required": ["model"] }
            ],
            "properties": {
                "label": { "type": "string" },
                "modelPath": { "type": "string" },
                "modelId": { "type": "string" },
                "model": { "type": "string" },
                "temperature": { "type": "number", "minimum": TEMPERATURE_RANGE.0, "maximum": TEMPERATURE_RANGE.1 },
                "params": { "type": "object" },
                "timeoutMs": { "type": "integer", "minimum": 0 }
            }
        })
    }
}

/// Configuration of an `output` node. `result` holds the last text it received.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl OutputData {
    pub fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "label": { "type": "string" },
                "result": { "type": "string" }
            }
        })
    }
}

/// Per-kind node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Input(InputData),
    Llm(LlmData),
    Output(OutputData),
    /// Payload of a kind handled by an extension runner.
    Other {
        kind: String,
        data: serde_json::Value,
    },
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Input(_) => NodeKind::Input,
            NodeData::Llm(_) => NodeKind::Llm,
            NodeData::Output(_) => NodeKind::Output,
            NodeData::Other {
                kind,
                ..
            } => NodeKind::Other(kind.clone()),
        }
    }

    /// JSON schema the payload of a built-in kind must satisfy.
    pub fn schema(kind: &NodeKind) -> Option<serde_json::Value> {
        match kind {
            NodeKind::Input => Some(InputData::schema()),
            NodeKind::Llm => Some(LlmData::schema()),
            NodeKind::Output => Some(OutputData::schema()),
            NodeKind::Other(_) => None,
        }
    }

    /// Builds the payload for `kind` from its JSON form.
    pub fn from_value(
        kind: &NodeKind,
        value: serde_json::Value,
    ) -> Result<Self> {
        let data = match kind {
            NodeKind::Input => NodeData::Input(serde_json::from_value(value)?),
            NodeKind::Llm => NodeData::Llm(serde_json::from_value(value)?),
            NodeKind::Output => NodeData::Output(serde_json::from_value(value)?),
            NodeKind::Other(kind) => NodeData::Other {
                kind: kind.clone(),
                data: value,
            },
        };
        Ok(data)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            NodeData::Input(d) => serde_json::to_value(d)?,
            NodeData::Llm(d) => serde_json::to_value(d)?,
            NodeData::Output(d) => serde_json::to_value(d)?,
            NodeData::Other {
                data,
                ..
            } => data.clone(),
        };
        Ok(value)
    }

    /// Value-level checks that hold for any graph accepted by the validator.
    pub fn check(&self) -> std::result::Result<(), String> {
        if let NodeData::Llm(llm) = self {
            if llm.model_path.trim().is_empty() {
                return Err("model reference is empty".to_string());
            }
            let (min, max) = TEMPERATURE_RANGE;
            if !(min..=max).contains(&llm.temperature) {
                return Err(format!("temperature {} outside [{min}, {max}]", llm.temperature));
            }
        }
        Ok(())
    }
}

/// A typed processing stage in the workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// node id
    pub id: NodeId,
    /// canvas position
    pub position: Position,
    /// kind-specific configuration
    pub data: NodeData,
}

impl Node {
    pub fn new(
        id: impl Into<NodeId>,
        data: NodeData,
    ) -> Self {
        Self {
            id: id.into(),
            position: Position::default(),
            data,
        }
    }

    pub fn input(
        id: impl Into<NodeId>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(id, NodeData::Input(InputData::new(text)))
    }

    pub fn llm(
        id: impl Into<NodeId>,
        model_path: impl Into<String>,
    ) -> Self {
        Self::new(id, NodeData::Llm(LlmData::new(model_path)))
    }

    pub fn output(id: impl Into<NodeId>) -> Self {
        Self::new(id, NodeData::Output(OutputData::default()))
    }

    pub fn at(
        mut self,
        position: Position,
    ) -> Self {
        self.position = position;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    /// Rejects nodes that could not be written to and read back from a workflow file.
    pub fn check_shape(&self) -> Result<()> {
        let violation = |reason: String| FlowError::SchemaViolation {
            node_id: self.id.clone(),
            reason,
        };
        if self.id.is_empty() {
            return Err(violation("node id is empty".to_string()));
        }
        if !self.position.is_finite() {
            return Err(violation(format!("position ({}, {}) is not finite", self.position.x, self.position.y)));
        }
        match &self.data {
            NodeData::Other {
                kind,
                ..
            } if kind.is_empty() => Err(violation("node kind is empty".to_string())),
            NodeData::Other {
                kind,
                ..
            } if !matches!(NodeKind::parse(kind), NodeKind::Other(_)) => Err(violation(format!("kind '{kind}' is built in and needs its typed data"))),
            NodeData::Llm(llm) if !llm.temperature.is_finite() => Err(violation("temperature is not finite".to_string())),
            _ => Ok(()),
        }
    }

    /// Shallow-merges `patch` into the node's JSON data and re-parses it as the same kind.
    pub fn patch_data(
        &mut self,
        patch: serde_json::Value,
    ) -> Result<()> {
        let serde_json::Value::Object(patch) = patch else {
            return Err(FlowError::SchemaViolation {
                node_id: self.id.clone(),
                reason: "data patch must be a JSON object".to_string(),
            });
        };

        let mut value = self.data.to_value()?;
        match value.as_object_mut() {
            Some(current) => current.extend(patch),
            None => value = serde_json::Value::Object(patch),
        }

        self.data = NodeData::from_value(&self.kind(), value).map_err(|e| FlowError::SchemaViolation {
            node_id: self.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
