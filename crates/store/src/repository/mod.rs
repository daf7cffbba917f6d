//! Definition repository: where the engine loads workflow definitions from.

mod definitions;

pub use definitions::{DefinitionRepository, InMemoryDefinitions};
