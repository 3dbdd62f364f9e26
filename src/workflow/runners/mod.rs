pub mod input;
pub mod llm;
pub mod output;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    Result,
    workflow::node::{Node, NodeId, NodeKind},
};

pub use input::InputRunner;
pub use llm::LlmRunner;
pub use output::OutputRunner;

/// Separator placed between upstream texts when a node has several producers.
pub const INPUT_SEPARATOR: &str = "\n";

/// How many distinct upstream producers a kind accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const ANY: Arity = Arity {
        min: 0,
        max: None,
    };

    pub const fn exactly(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub fn check(
        &self,
        producers: usize,
    ) -> std::result::Result<(), String> {
        if producers < self.min {
            return Err(format!("expects at least {} upstream producer(s), found {}", self.min, producers));
        }
        if let Some(max) = self.max {
            if producers > max {
                return Err(format!("expects at most {} upstream producer(s), found {}", max, producers));
            }
        }
        Ok(())
    }
}

/// Upstream values handed to a runner, keyed by producing node.
///
/// Values are ordered by their producer's position in the run's topological
/// order, which makes concatenation deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInputs {
    values: Vec<(NodeId, String)>,
}

impl NodeInputs {
    pub fn new(values: Vec<(NodeId, String)>) -> Self {
        Self {
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(nid, v)| (nid.as_str(), v.as_str()))
    }

    /// value produced by `producer`
    pub fn get(
        &self,
        producer: &str,
    ) -> Option<&str> {
        self.values.iter().find(|(nid, _)| nid == producer).map(|(_, v)| v.as_str())
    }

    /// All upstream texts joined in producer order.
    pub fn concat(&self) -> String {
        self.values.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>().join(INPUT_SEPARATOR)
    }
}

/// Behavior bound to a node kind.
///
/// A runner consumes zero or more upstream values and produces exactly one
/// value, or fails. New kinds are added by registering another runner; the
/// executor never matches on kinds itself.
#[async_trait]
pub trait Runner: Send + Sync {
    /// The kind this runner executes.
    fn kind(&self) -> NodeKind;

    /// JSON schema the node's data must satisfy.
    fn schema(&self) -> serde_json::Value {
        json!({})
    }

    /// Number of upstream producers this kind accepts.
    fn arity(&self) -> Arity {
        Arity::ANY
    }

    /// Whether the value this runner returns is part of the run's terminal result.
    fn is_terminal(&self) -> bool {
        false
    }

    /// Executes `node` with the values of its direct predecessors.
    ///
    /// # Returns
    ///
    /// The node's output value, stored for its successors.
    async fn run(
        &self,
        node: &Node,
        inputs: NodeInputs,
    ) -> Result<String>;
}
