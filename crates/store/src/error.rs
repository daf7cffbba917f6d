//! Typed error type for the store crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
