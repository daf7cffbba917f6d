//! `nodes` crate: the `NodeExecutor` trait, the closed set of node types,
//! the run-time execution context, and the built-in executors.
//!
//! Every executor, built-in or test double, implements [`NodeExecutor`].
//! The engine crate dispatches execution through this trait object.

pub mod builtin;
pub mod collaborators;
pub mod context;
pub mod error;
pub mod mock;
pub mod node_type;
pub mod traits;

pub use collaborators::{Collaborators, CollaboratorError};
pub use context::{ContextSnapshot, ExecutionContext};
pub use error::NodeError;
pub use node_type::NodeType;
pub use traits::{ExecutionOutcome, NodeExecutor, NodeInvocation, OutputWrites};
