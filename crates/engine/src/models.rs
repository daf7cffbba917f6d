//! Workflow definition model.
//!
//! These types are the in-memory shape of a definition. They serialise
//! to/from the JSON `definition` column of a [`store::WorkflowRow`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use store::WorkflowRow;

use crate::ValidationError;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is started. Detection lives outside the engine; this is
/// carried so dispatchers can match incoming events to definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Triggered explicitly through the control API.
    #[default]
    Manual,
    /// Triggered by an incoming HTTP request.
    Webhook {
        path: String,
    },
    /// Triggered on a cron schedule.
    Schedule {
        cron: String,
        #[serde(default)]
        timezone: Option<String>,
    },
    /// Triggered by a named domain event (`lead.created`, `email.opened`, ...).
    Event {
        name: String,
    },
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// What happens to the run when a node fails for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop claiming nodes; the run ends `failed`.
    #[default]
    Halt,
    /// Skip everything downstream of the node, let other branches finish.
    Continue,
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    /// Name of a [`nodes::NodeType`]; resolved when the definition is loaded.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Configuration passed to the executor at execution time.
    #[serde(default)]
    pub config: Value,
    /// Context keys this node may write. Empty means unrestricted.
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Overrides the engine-wide attempt budget.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Overrides the engine-wide execution timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: Value::Null,
            outputs: Vec::new(),
            on_failure: FailurePolicy::Halt,
            max_attempts: None,
            timeout_ms: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another, optionally guarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(alias = "source")]
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
    /// Predicate over the context; see [`crate::guard`]. Absent means always taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Value>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: None,
        }
    }

    pub fn guarded(from: impl Into<String>, to: impl Into<String>, guard: Value) -> Self {
        Self {
            guard: Some(guard),
            ..Self::new(from, to)
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub trigger: Trigger,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDefinition {
    /// Convenience constructor for testing.
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        nodes: Vec<NodeDefinition>,
        edges: Vec<Edge>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trigger,
            nodes,
            edges,
        }
    }

    /// Parse a stored row. The row's id and name win over whatever the JSON says.
    pub fn from_row(row: WorkflowRow) -> Result<Self, ValidationError> {
        let mut definition: Self = serde_json::from_value(row.definition)
            .map_err(|e| ValidationError::MalformedDefinition(e.to_string()))?;
        definition.id = row.id;
        definition.name = row.name;
        Ok(definition)
    }

    pub fn to_row(&self) -> Result<WorkflowRow, serde_json::Error> {
        Ok(WorkflowRow::new(self.id, self.name.clone(), serde_json::to_value(self)?))
    }
}
