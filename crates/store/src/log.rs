//! Run log sinks: append-only destinations for state transitions.
//!
//! The engine writes to a sink but never reads from it.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::{models::TransitionRecord, StoreError};

#[async_trait]
pub trait RunLogSink: Send + Sync {
    async fn append(&self, record: TransitionRecord) -> Result<(), StoreError>;
}

/// Keeps every record in memory, in append order.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<TransitionRecord>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<TransitionRecord> {
        self.records.lock().await.clone()
    }

    /// Records of one run, in append order.
    pub async fn for_run(&self, run_id: Uuid) -> Vec<TransitionRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RunLogSink for MemoryLogSink {
    async fn append(&self, record: TransitionRecord) -> Result<(), StoreError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Emits every record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

#[async_trait]
impl RunLogSink for TracingLogSink {
    async fn append(&self, record: TransitionRecord) -> Result<(), StoreError> {
        info!(
            run_id = %record.run_id,
            node_id = record.node_id.as_deref().unwrap_or("-"),
            from = %record.from_status,
            to = %record.to_status,
            reason = record.reason.as_deref().unwrap_or(""),
            "transition"
        );
        Ok(())
    }
}
