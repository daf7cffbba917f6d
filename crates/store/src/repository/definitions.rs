//! Workflow definition storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{models::WorkflowRow, StoreError};

/// Source of workflow definitions.
///
/// Implementations must return [`StoreError::NotFound`] for unknown ids.
#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<WorkflowRow, StoreError>;
}

/// Process-local definition store.
#[derive(Debug, Default)]
pub struct InMemoryDefinitions {
    rows: RwLock<HashMap<Uuid, WorkflowRow>>,
}

impl InMemoryDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition.
    pub async fn insert(&self, row: WorkflowRow) {
        info!(workflow_id = %row.id, name = %row.name, "storing workflow definition");
        self.rows.write().await.insert(row.id, row);
    }

    /// Return all definitions ordered by creation time (newest first).
    pub async fn list(&self) -> Vec<WorkflowRow> {
        let mut rows: Vec<WorkflowRow> = self.rows.read().await.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    /// Remove a definition.
    ///
    /// Returns `StoreError::NotFound` if nothing was removed.
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl DefinitionRepository for InMemoryDefinitions {
    async fn load(&self, id: Uuid) -> Result<WorkflowRow, StoreError> {
        self.rows.read().await.get(&id).cloned().ok_or(StoreError::NotFound)
    }
}
