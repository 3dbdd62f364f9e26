//! Conversion between a [`Workflow`] and its workflow-file form.
//!
//! Export always writes [`CURRENT_VERSION`]. Import checks the version
//! before anything else, validates each built-in node's data against the
//! kind's JSON schema, and does not run the graph validator: cyclic or
//! dangling graphs load fine and must be validated before use.

use std::collections::HashSet;

use serde_json::json;

use crate::{
    FlowError, Result, SerializationError,
    model::{CURRENT_VERSION, EdgeModel, NodeModel, SUPPORTED_VERSIONS, WorkflowModel},
    workflow::{
        Workflow,
        edge::Edge,
        node::{Node, NodeData, NodeKind},
    },
};

/// Serializes `workflow` into a workflow document.
pub fn export(workflow: &Workflow) -> Result<String> {
    WorkflowModel::try_from(workflow)?.to_json()
}

/// Parses a workflow document.
pub fn import(document: &str) -> Result<Workflow> {
    import_bytes(document.as_bytes())
}

/// Parses a workflow document from raw bytes.
pub fn import_bytes(document: &[u8]) -> Result<Workflow> {
    let value: serde_json::Value = serde_json::from_slice(document).map_err(|e| SerializationError::MalformedDocument(e.to_string()))?;

    let Some(object) = value.as_object() else {
        return Err(SerializationError::MalformedDocument("workflow document must be a JSON object".to_string()).into());
    };
    match object.get("version") {
        Some(serde_json::Value::String(v)) if SUPPORTED_VERSIONS.contains(&v.as_str()) => {}
        Some(serde_json::Value::String(v)) => return Err(SerializationError::UnsupportedVersion(Some(v.clone())).into()),
        Some(serde_json::Value::Null) | None => return Err(SerializationError::UnsupportedVersion(None).into()),
        Some(other) => return Err(SerializationError::UnsupportedVersion(Some(other.to_string())).into()),
    }

    let model: WorkflowModel = serde_json::from_value(value).map_err(|e| SerializationError::MalformedDocument(e.to_string()))?;
    Workflow::try_from(&model)
}

impl TryFrom<&Workflow> for WorkflowModel {
    type Error = FlowError;

    fn try_from(workflow: &Workflow) -> Result<Self> {
        let nodes = workflow
            .nodes()
            .map(|node| {
                Ok(NodeModel {
                    id: node.id.clone(),
                    kind: Some(node.kind().to_string()),
                    position: node.position,
                    data: node.data.to_value()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let edges = workflow
            .edges()
            .iter()
            .map(|edge| EdgeModel {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                animated: edge.animated,
                source_handle: edge.source_port.clone(),
                target_handle: edge.target_port.clone(),
            })
            .collect();

        Ok(WorkflowModel {
            version: Some(CURRENT_VERSION.to_string()),
            nodes,
            edges,
        })
    }
}

impl TryFrom<&WorkflowModel> for Workflow {
    type Error = FlowError;

    fn try_from(model: &WorkflowModel) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::with_capacity(model.nodes.len());
        for node in model.nodes.iter() {
            if !seen.insert(node.id.as_str()) {
                return Err(SerializationError::DuplicateId(node.id.clone()).into());
            }
            nodes.push(node_from_model(node)?);
        }

        let mut seen = HashSet::new();
        let mut edges = Vec::with_capacity(model.edges.len());
        for edge in model.edges.iter() {
            if !seen.insert(edge.id.as_str()) {
                return Err(SerializationError::DuplicateId(edge.id.clone()).into());
            }
            edges.push(Edge {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                source_port: edge.source_handle.clone(),
                target_port: edge.target_handle.clone(),
                animated: edge.animated,
            });
        }

        Workflow::from_parts(nodes, edges)
    }
}

fn node_from_model(model: &NodeModel) -> std::result::Result<Node, SerializationError> {
    if model.id.is_empty() {
        return Err(SerializationError::MalformedDocument("node without an id".to_string()));
    }
    let malformed = |reason: String| SerializationError::MalformedNode {
        node_id: model.id.clone(),
        reason,
    };

    let kind = match model.kind.as_deref() {
        Some(kind) if !kind.is_empty() => NodeKind::parse(kind),
        _ => return Err(malformed("missing node type".to_string())),
    };

    let mut data = model.data.clone();
    if let Some(schema) = NodeData::schema(&kind) {
        if data.is_null() {
            data = json!({});
        }
        jsonschema::validate(&schema, &data).map_err(|e| malformed(e.to_string()))?;
    }
    let data = NodeData::from_value(&kind, data).map_err(|e| malformed(e.to_string()))?;

    Ok(Node {
        id: model.id.clone(),
        position: model.position,
        data,
    })
}
