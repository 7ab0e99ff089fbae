use crate::config::StorageConfig;
use crate::storage::traits::{BlockStorage, StorageError, StoredBlock};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const BLOCKS_TREE: &str = "blocks";
const METADATA_TREE: &str = "metadata";
const HEIGHT_HINT_KEY: &[u8] = b"height_hint";

/// Persistent block store backed by sled.
///
/// Every copy lives under its own key: the height in big-endian followed by a
/// database-unique id, so copies of one height are contiguous and ordered by
/// insertion.
pub struct SledStorage {
    db: sled::Db,
    blocks: sled::Tree,
    metadata: sled::Tree,
    closed: AtomicBool,
}

fn copy_key(height: u64, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&height.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

fn height_of(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

impl SledStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::with_config(&StorageConfig {
            db_path: path.as_ref().to_path_buf(),
            ..StorageConfig::default()
        })
    }

    pub fn with_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .path(&config.db_path)
            .cache_capacity(config.cache_capacity)
            .flush_every_ms(config.flush_every_ms)
            .mode(sled::Mode::HighThroughput)
            .open()?;

        info!("block storage opened at {:?}", config.db_path);
        Ok(Self {
            blocks: db.open_tree(BLOCKS_TREE)?,
            metadata: db.open_tree(METADATA_TREE)?,
            db,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::NotReady);
        }
        Ok(())
    }

    /// Every stored copy at `height`, oldest first
    pub fn copies(&self, height: u64) -> Result<Vec<StoredBlock>, StorageError> {
        self.blocks
            .scan_prefix(height.to_be_bytes())
            .values()
            .map(|value| -> Result<StoredBlock, StorageError> {
                Ok(serde_json::from_slice(&value?)?)
            })
            .collect()
    }
}

#[async_trait]
impl BlockStorage for SledStorage {
    fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn current_height(&self) -> Result<u64, StorageError> {
        self.ensure_open()?;
        match self.blocks.last()? {
            Some((key, _)) => height_of(&key).ok_or(StorageError::Empty),
            None => Err(StorageError::Empty),
        }
    }

    async fn height_hint(&self) -> Result<Option<u64>, StorageError> {
        self.ensure_open()?;
        Ok(self
            .metadata
            .get(HEIGHT_HINT_KEY)?
            .and_then(|bytes| height_of(&bytes)))
    }

    async fn set_height_hint(&self, height: u64) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.metadata
            .insert(HEIGHT_HINT_KEY, &height.to_be_bytes()[..])?;
        Ok(())
    }

    async fn get_block(&self, height: u64) -> Result<Value, StorageError> {
        self.ensure_open()?;
        match self.blocks.scan_prefix(height.to_be_bytes()).values().next() {
            Some(value) => {
                let stored: StoredBlock = serde_json::from_slice(&value?)?;
                Ok(stored.payload)
            }
            None => Err(StorageError::NotFound(height)),
        }
    }

    async fn put_block(
        &self,
        height: u64,
        payload: &Value,
        source: &str,
    ) -> Result<(), StorageError> {
        self.ensure_open()?;
        let record = StoredBlock::new(height, payload.clone(), source);
        let id = self.db.generate_id()?;
        self.blocks
            .insert(copy_key(height, id), serde_json::to_vec(&record)?)?;
        debug!("stored block copy. height: {} source: {}", height, source);
        Ok(())
    }

    async fn redundancy_histogram(
        &self,
        start: u64,
        end: u64,
    ) -> Result<BTreeMap<u64, u32>, StorageError> {
        self.ensure_open()?;
        let mut histogram = BTreeMap::new();
        if start > end {
            return Ok(histogram);
        }
        let range = copy_key(start, 0)..=copy_key(end, u64::MAX);
        for key in self.blocks.range(range).keys() {
            if let Some(height) = height_of(&key?) {
                *histogram.entry(height).or_insert(0) += 1;
            }
        }
        Ok(histogram)
    }

    async fn prune_block(&self, height: u64, keep: u32) -> Result<(), StorageError> {
        self.ensure_open()?;
        let surplus: Vec<_> = self
            .blocks
            .scan_prefix(height.to_be_bytes())
            .keys()
            .skip(keep as usize)
            .collect::<Result<_, _>>()?;
        for key in &surplus {
            self.blocks.remove(key)?;
        }
        if !surplus.is_empty() {
            debug!("pruned {} copies at height {}", surplus.len(), height);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.db.flush_async().await?;
        info!("block storage closed");
        Ok(())
    }
}
