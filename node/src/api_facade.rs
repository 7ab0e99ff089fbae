//! Read API facade
//!
//! Answers callers from storage where possible and falls back to the mesh,
//! back-filling storage with whatever it learns on the way.

use crate::network::Mesh;
use crate::rpc::RpcError;
use crate::storage::{BlockStorage, StorageError};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No peer available")]
    NoPeerAvailable,
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct ApiFacade {
    mesh: Arc<Mesh>,
    storage: Arc<dyn BlockStorage>,
}

// Ensure ApiFacade is Send + Sync
static_assertions::assert_impl_all!(ApiFacade: Send, Sync);

impl ApiFacade {
    pub fn new(mesh: Arc<Mesh>, storage: Arc<dyn BlockStorage>) -> Self {
        Self { mesh, storage }
    }

    pub fn mesh(&self) -> Arc<Mesh> {
        Arc::clone(&self.mesh)
    }

    pub fn storage(&self) -> Arc<dyn BlockStorage> {
        Arc::clone(&self.storage)
    }

    /// Current chain height: storage first, then the highest peer.
    ///
    /// Storage answers with the larger of its stored height and its height
    /// hint. A height learned from a peer is recorded as the hint.
    pub async fn get_block_count(&self) -> Result<u64, ApiError> {
        let stored = match self.storage.current_height().await {
            Ok(height) => Some(height),
            Err(e) => {
                debug!("no stored height: {}", e);
                None
            }
        };
        let hint = match self.storage.height_hint().await {
            Ok(hint) => hint,
            Err(e) => {
                debug!("no height hint: {}", e);
                None
            }
        };
        if let Some(height) = stored.max(hint) {
            return Ok(height);
        }

        let peer = self
            .mesh
            .get_highest_peer(true)
            .ok_or(ApiError::NoPeerAvailable)?;
        let height = peer.get_block_count().await?;
        if let Err(e) = self.storage.set_height_hint(height).await {
            warn!("unable to record height hint {}: {}", height, e);
        }
        Ok(height)
    }

    /// Block at `height`: storage first, then the fastest peer, storing what it returns.
    pub async fn get_block(&self, height: u64) -> Result<Value, ApiError> {
        match self.storage.get_block(height).await {
            Ok(block) => return Ok(block),
            Err(e) => debug!("block {} not served from storage: {}", height, e),
        }

        let peer = self
            .mesh
            .get_fastest_peer(true)
            .ok_or(ApiError::NoPeerAvailable)?;
        let block = peer.get_block(height).await?;
        if let Err(e) = self.storage.put_block(height, &block, peer.endpoint()).await {
            warn!("unable to store block {}: {}", height, e);
        }
        Ok(block)
    }

    pub async fn get_version(&self) -> Result<Value, ApiError> {
        let peer = self
            .mesh
            .get_random_peer(true)
            .ok_or(ApiError::NoPeerAvailable)?;
        Ok(peer.get_version().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MeshConfig, SyncerConfig};
    use crate::rpc::{methods, ScriptedEndpoint, ScriptedTransport};
    use crate::storage::MemoryStorage;
    use crate::sync::Syncer;
    use serde_json::json;

    const PEER: &str = "http://peer-a:10332";

    async fn facade() -> (ApiFacade, Arc<MemoryStorage>, Arc<ScriptedTransport>) {
        let transport =
            Arc::new(ScriptedTransport::new().with_endpoint(PEER, ScriptedEndpoint::at_height(42)));
        let mesh = Arc::new(
            Mesh::from_endpoints(
                &[PEER.to_string()],
                transport.clone(),
                MeshConfig {
                    start_benchmark_on_init: false,
                    ..MeshConfig::default()
                },
            )
            .unwrap(),
        );
        mesh.probe(&mesh.peers()[0].clone()).await;
        let storage = Arc::new(MemoryStorage::new());
        (ApiFacade::new(mesh, storage.clone()), storage, transport)
    }

    #[tokio::test]
    async fn block_count_falls_back_to_mesh_and_back_fills() {
        let (api, storage, transport) = facade().await;

        assert_eq!(api.get_block_count().await.unwrap(), 42);
        assert_eq!(storage.height_hint().await.unwrap(), Some(42));
        assert!(matches!(storage.current_height().await, Err(StorageError::Empty)));

        // Served from storage from now on
        let calls = transport.call_count(PEER, methods::GET_BLOCK_COUNT);
        assert_eq!(api.get_block_count().await.unwrap(), 42);
        assert_eq!(transport.call_count(PEER, methods::GET_BLOCK_COUNT), calls);
    }

    #[tokio::test]
    async fn recorded_hint_leaves_the_sync_start_alone() {
        let (api, storage, _) = facade().await;
        assert_eq!(api.get_block_count().await.unwrap(), 42);

        let syncer = Syncer::new(api.mesh(), storage, SyncerConfig::default()).unwrap();
        assert_eq!(syncer.initialize_write_pointer().await, 0);
        assert_eq!(syncer.enqueue_tick(), 42);
    }

    #[tokio::test]
    async fn stored_height_above_hint_wins() {
        let (api, storage, transport) = facade().await;
        storage.set_height_hint(10).await.unwrap();
        storage.put_block(15, &json!({"index": 15}), PEER).await.unwrap();

        assert_eq!(api.get_block_count().await.unwrap(), 15);
        assert_eq!(transport.call_count(PEER, methods::GET_BLOCK_COUNT), 1);
    }

    #[tokio::test]
    async fn block_is_fetched_once_then_cached() {
        let (api, storage, transport) = facade().await;

        let block = api.get_block(8).await.unwrap();
        assert_eq!(block["index"], json!(8));
        assert_eq!(storage.copies(8)[0].source, PEER);

        api.get_block(8).await.unwrap();
        assert_eq!(transport.call_count(PEER, methods::GET_BLOCK), 1);
    }

    #[tokio::test]
    async fn no_active_peer_is_an_error() {
        let (api, _, transport) = facade().await;
        transport.set_unreachable(PEER, true);
        assert!(api.get_version().await.is_err());

        // The failed call marked the only peer inactive
        assert!(matches!(api.get_version().await, Err(ApiError::NoPeerAvailable)));
        assert!(matches!(api.get_block_count().await, Err(ApiError::NoPeerAvailable)));
    }
}
