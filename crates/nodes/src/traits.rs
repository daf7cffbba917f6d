//! The `NodeExecutor` trait: the contract every executor must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{ContextSnapshot, NodeError, NodeType};

/// Key/value pairs a successful node writes into the execution context.
pub type OutputWrites = Map<String, Value>;

/// What a single executor invocation reports back to the engine.
///
/// The engine alone turns an outcome into node and run status changes:
/// - `Success`: writes are applied, the node completes, outgoing guards are evaluated.
/// - `Retryable`: the node is re-claimed after back-off until its attempt budget runs out.
/// - `Fatal`: the node fails and its failure policy decides what happens to the run.
/// - `Skip`: the node is skipped and its outgoing edges are not taken.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success(OutputWrites),
    Retryable(String),
    Fatal(String),
    Skip(String),
}

impl ExecutionOutcome {
    /// Success without any context writes.
    pub fn done() -> Self {
        Self::Success(OutputWrites::new())
    }

    /// Success writing a single key.
    pub fn write(key: impl Into<String>, value: Value) -> Self {
        let mut writes = OutputWrites::new();
        writes.insert(key.into(), value);
        Self::Success(writes)
    }
}

impl From<NodeError> for ExecutionOutcome {
    fn from(err: NodeError) -> Self {
        Self::Fatal(err.to_string())
    }
}

/// Everything an executor gets to see about the node it is running.
#[derive(Debug, Clone)]
pub struct NodeInvocation {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub node_id: String,
    pub node_type: NodeType,
    /// Static configuration from the definition, interpreted by the executor.
    pub config: Value,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Context as it was when the node was claimed.
    pub context: ContextSnapshot,
}

impl NodeInvocation {
    /// Stable across retries of the same node in the same run, so side-effecting
    /// collaborators can deduplicate.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.run_id, self.node_id)
    }

    /// Deserialize the node's configuration into the executor's own shape.
    pub fn parse_config<T: serde::de::DeserializeOwned>(&self) -> Result<T, NodeError> {
        let config = match &self.config {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(config).map_err(|e| NodeError::InvalidConfig {
            node_id: self.node_id.clone(),
            message: e.to_string(),
        })
    }
}

/// The core executor trait.
///
/// Implementations must be safe to call again for the same node after a
/// `Retryable` outcome; side effects should be keyed on
/// [`NodeInvocation::idempotency_key`].
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Node types this executor is registered for.
    fn node_types(&self) -> Vec<NodeType>;

    /// Run the node. Never panics on bad input; report it as an outcome instead.
    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome;
}
