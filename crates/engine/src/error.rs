//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::state::RunStatus;

/// A definition that cannot be turned into an executable graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Depth-first traversal found a back-edge into a node still on the stack.
    #[error("workflow graph contains a cycle through '{0}'")]
    CycleDetected(String),

    /// Every node has an incoming edge (or there are no nodes at all).
    #[error("workflow has no entry nodes")]
    NoEntryNodes,

    /// The stored JSON does not have the definition's shape.
    #[error("malformed workflow definition: {0}")]
    MalformedDefinition(String),
}

/// Errors produced by the workflow engine (loading + control API).
///
/// Node failures are not here: they are captured as outcomes and folded into
/// run status.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The node names a type outside the closed set, or no executor is
    /// registered for it.
    #[error("node '{node_id}' has type '{node_type}' with no registered executor")]
    UnknownNodeType {
        node_id: String,
        node_type: String,
    },

    #[error("workflow definition {0} not found")]
    DefinitionNotFound(Uuid),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    /// Control API misuse, e.g. resuming a completed run.
    #[error("cannot {action} run {run_id} while it is {status}")]
    InvalidStateTransition {
        run_id: Uuid,
        status: RunStatus,
        action: &'static str,
    },

    /// Persistence error from the store crate.
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
}
