use crate::api_facade::ApiFacade;
use crate::config::{ConfigValidationError, MirrorConfig};
use crate::network::{Mesh, Peer};
use crate::rpc::{HttpRpcClient, RpcError, RpcTransport};
use crate::storage::{open_storage, BlockStorage, StorageError};
use crate::sync::Syncer;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

/// Everything a running mirror needs, wired together from one configuration.
pub struct Node {
    config: MirrorConfig,
    mesh: Arc<Mesh>,
    storage: Arc<dyn BlockStorage>,
    api: Arc<ApiFacade>,
    syncer: Syncer<dyn BlockStorage>,
}

impl Node {
    /// Build the node over HTTP peers
    pub async fn new(config: MirrorConfig) -> Result<Self, NodeError> {
        let transport = Arc::new(HttpRpcClient::new(config.network.rpc_timeout)?);
        Self::with_transport(config, transport).await
    }

    /// Build the node over any transport. Starts the benchmark and the syncer
    /// when configured to.
    pub async fn with_transport(
        config: MirrorConfig,
        transport: Arc<dyn RpcTransport>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        info!("Starting chain mirror node on {}", config.network.profile);

        let peers = config
            .network
            .resolve_endpoints()?
            .into_iter()
            .map(|endpoint| Arc::new(Peer::new(endpoint, Arc::clone(&transport))))
            .collect();
        let mesh = Mesh::spawn(peers, config.mesh.clone())?;

        let storage = open_storage(&config.storage)?;
        let api = Arc::new(ApiFacade::new(Arc::clone(&mesh), Arc::clone(&storage)));
        let syncer = Syncer::new(Arc::clone(&mesh), Arc::clone(&storage), config.syncer.clone())?;

        if config.syncer.start_on_init {
            syncer.start().await;
        }

        Ok(Self {
            config,
            mesh,
            storage,
            api,
            syncer,
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn mesh(&self) -> Arc<Mesh> {
        Arc::clone(&self.mesh)
    }

    pub fn storage(&self) -> Arc<dyn BlockStorage> {
        Arc::clone(&self.storage)
    }

    pub fn api(&self) -> Arc<ApiFacade> {
        Arc::clone(&self.api)
    }

    pub fn syncer(&self) -> &Syncer<dyn BlockStorage> {
        &self.syncer
    }

    /// Stop the syncer and the benchmark, then close storage
    pub async fn close(&self) -> Result<(), NodeError> {
        info!("Stopping chain mirror node...");
        self.syncer.stop().await;
        self.mesh.stop_benchmark();
        self.storage.close().await?;
        info!("Node stopped successfully");
        Ok(())
    }
}
