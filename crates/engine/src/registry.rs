//! Executor registry: maps each [`NodeType`] to the executor that runs it.

use std::collections::HashMap;
use std::sync::Arc;

use nodes::{builtin, Collaborators, NodeExecutor, NodeType};
use tracing::debug;

use crate::{graph::ValidatedGraph, EngineError};

/// Tagged dispatch table from the closed node-type set to executors.
///
/// Registering an executor binds it to every type it declares; a later
/// registration for the same type replaces the earlier one.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in executor, side effects routed to `collaborators`.
    pub fn with_builtins(collaborators: &Collaborators) -> Self {
        let mut registry = Self::new();
        for executor in builtin::all(collaborators) {
            registry.register(executor);
        }
        registry
    }

    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) -> &mut Self {
        for node_type in executor.node_types() {
            debug!(%node_type, "registering executor");
            self.executors.insert(node_type, executor.clone());
        }
        self
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(&node_type).cloned()
    }

    /// Node types with a registered executor, sorted.
    pub fn node_types(&self) -> Vec<NodeType> {
        let mut types: Vec<NodeType> = self.executors.keys().copied().collect();
        types.sort();
        types
    }

    /// Fail fast if any node of `graph` has no executor.
    pub fn ensure_supported(&self, graph: &ValidatedGraph) -> Result<(), EngineError> {
        for node in graph.nodes() {
            if !self.executors.contains_key(&node.node_type) {
                return Err(EngineError::UnknownNodeType {
                    node_id: node.definition.id.clone(),
                    node_type: node.node_type.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}
