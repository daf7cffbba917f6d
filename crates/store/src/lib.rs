//! `store` crate: the persistence boundary of the engine.
//!
//! Defines the row types that cross it, the [`DefinitionRepository`] and
//! [`RunLogSink`] traits the engine consumes, and in-process implementations
//! of both. No workflow semantics live here: definitions travel as JSON and
//! are parsed by the `engine` crate.

pub mod error;
pub mod log;
pub mod models;
pub mod repository;

pub use error::StoreError;
pub use log::{MemoryLogSink, RunLogSink, TracingLogSink};
pub use models::{TransitionRecord, WorkflowRow};
pub use repository::{DefinitionRepository, InMemoryDefinitions};
