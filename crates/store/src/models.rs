//! Row structs that cross the persistence boundary.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A stored workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON workflow definition (trigger, nodes, edges).
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRow {
    pub fn new(id: Uuid, name: impl Into<String>, definition: serde_json::Value) -> Self {
        Self {
            id,
            name: name.into(),
            definition,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// run transition log
// ---------------------------------------------------------------------------

/// One state transition of a run (`node_id == None`) or of one of its nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub run_id: Uuid,
    pub node_id: Option<String>,
    pub from_status: String,
    pub to_status: String,
    pub at: DateTime<Utc>,
    /// Failure reason, skip reason, retry note.
    pub reason: Option<String>,
    /// Context snapshot at the time of the transition, when recorded.
    pub context: Option<serde_json::Value>,
}

impl TransitionRecord {
    pub fn is_run_level(&self) -> bool {
        self.node_id.is_none()
    }
}
