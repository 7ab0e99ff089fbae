// Storage module for the chain mirror node
//
// Block persistence: the storage trait plus in-memory and sled backends

pub mod database;
pub mod memory;
pub mod traits;

pub use database::SledStorage;
pub use memory::MemoryStorage;
pub use traits::{BlockStorage, StorageError, StoredBlock};

use crate::config::{StorageBackend, StorageConfig};
use std::sync::Arc;

/// Open the backend selected in configuration
pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn BlockStorage>, StorageError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageBackend::Sled => Ok(Arc::new(SledStorage::with_config(config)?)),
    }
}
