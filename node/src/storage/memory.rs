use crate::storage::traits::{BlockStorage, StorageError, StoredBlock};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// Simple in-memory block store
#[derive(Default)]
pub struct MemoryStorage {
    blocks: RwLock<BTreeMap<u64, Vec<StoredBlock>>>,
    height_hint: RwLock<Option<u64>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored copy at `height`, oldest first
    pub fn copies(&self, height: u64) -> Vec<StoredBlock> {
        self.blocks.read().get(&height).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl BlockStorage for MemoryStorage {
    fn is_ready(&self) -> bool {
        true
    }

    async fn current_height(&self) -> Result<u64, StorageError> {
        self.blocks
            .read()
            .keys()
            .next_back()
            .copied()
            .ok_or(StorageError::Empty)
    }

    async fn height_hint(&self) -> Result<Option<u64>, StorageError> {
        Ok(*self.height_hint.read())
    }

    async fn set_height_hint(&self, height: u64) -> Result<(), StorageError> {
        *self.height_hint.write() = Some(height);
        Ok(())
    }

    async fn get_block(&self, height: u64) -> Result<Value, StorageError> {
        self.blocks
            .read()
            .get(&height)
            .and_then(|copies| copies.first())
            .map(|copy| copy.payload.clone())
            .ok_or(StorageError::NotFound(height))
    }

    async fn put_block(
        &self,
        height: u64,
        payload: &Value,
        source: &str,
    ) -> Result<(), StorageError> {
        self.blocks
            .write()
            .entry(height)
            .or_default()
            .push(StoredBlock::new(height, payload.clone(), source));
        Ok(())
    }

    async fn redundancy_histogram(
        &self,
        start: u64,
        end: u64,
    ) -> Result<BTreeMap<u64, u32>, StorageError> {
        if start > end {
            return Ok(BTreeMap::new());
        }
        Ok(self
            .blocks
            .read()
            .range(start..=end)
            .filter(|(_, copies)| !copies.is_empty())
            .map(|(height, copies)| (*height, copies.len() as u32))
            .collect())
    }

    async fn prune_block(&self, height: u64, keep: u32) -> Result<(), StorageError> {
        let mut blocks = self.blocks.write();
        if let Some(copies) = blocks.get_mut(&height) {
            copies.truncate(keep as usize);
            if copies.is_empty() {
                blocks.remove(&height);
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
