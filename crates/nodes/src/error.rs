//! Node-level error type.

use thiserror::Error;

/// Errors raised while a built-in executor prepares its work.
///
/// These never leave the executor as `Err`: they are folded into
/// [`ExecutionOutcome::Fatal`](crate::ExecutionOutcome::Fatal), since a bad
/// configuration will not fix itself on retry.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// The node's static configuration does not match what the executor expects.
    #[error("invalid configuration for node '{node_id}': {message}")]
    InvalidConfig { node_id: String, message: String },

    /// A context path the node needs is absent.
    #[error("context key '{0}' is missing")]
    MissingContextKey(String),
}
