//! `engine` crate: workflow definitions, graph validation, guard evaluation,
//! the run state machine and the execution engine.

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod guard;
pub mod models;
pub mod registry;
pub mod state;

pub use config::EngineConfig;
pub use error::{EngineError, ValidationError};
pub use executor::WorkflowExecutor;
pub use graph::ValidatedGraph;
pub use guard::{evaluate_guard, GuardError};
pub use models::{Edge, FailurePolicy, NodeDefinition, Trigger, WorkflowDefinition};
pub use registry::ExecutorRegistry;
pub use state::{NodeStatus, NodeView, RunFailure, RunStatus, RunView};

pub use nodes::{ExecutionContext, ExecutionOutcome, NodeType};

#[cfg(test)]
mod executor_tests;
