use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Block not found at height {0}")]
    NotFound(u64),
    #[error("Storage holds no blocks")]
    Empty,
    #[error("Database error: {0}")]
    Backend(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage is not ready")]
    NotReady,
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// One stored copy of a block, tagged with the peer it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBlock {
    pub height: u64,
    /// Endpoint of the peer that supplied the payload
    pub source: String,
    pub payload: Value,
    pub stored_at: DateTime<Utc>,
}

impl StoredBlock {
    pub fn new(height: u64, payload: Value, source: impl Into<String>) -> Self {
        Self {
            height,
            source: source.into(),
            payload,
            stored_at: Utc::now(),
        }
    }
}

/// Height-indexed block store that may hold several copies per height.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    /// Whether the backend can serve requests
    fn is_ready(&self) -> bool;

    /// Highest height with at least one stored copy
    async fn current_height(&self) -> Result<u64, StorageError>;

    /// Chain height last learned from a peer, if any.
    ///
    /// Never folded into `current_height`; the hint says nothing about what is stored.
    async fn height_hint(&self) -> Result<Option<u64>, StorageError>;

    /// Record a chain height learned from a peer
    async fn set_height_hint(&self, height: u64) -> Result<(), StorageError>;

    /// Payload of the first stored copy at `height`
    async fn get_block(&self, height: u64) -> Result<Value, StorageError>;

    /// Append one more copy at `height`
    async fn put_block(&self, height: u64, payload: &Value, source: &str)
        -> Result<(), StorageError>;

    /// Copy counts for every height in `start..=end` that has at least one copy
    async fn redundancy_histogram(
        &self,
        start: u64,
        end: u64,
    ) -> Result<BTreeMap<u64, u32>, StorageError>;

    /// Drop copies at `height` beyond the first `keep`
    async fn prune_block(&self, height: u64, keep: u32) -> Result<(), StorageError>;

    /// Release backend resources
    async fn close(&self) -> Result<(), StorageError>;
}
