pub mod api_facade;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod network;
pub mod node;
pub mod rpc;
pub mod storage;
pub mod sync;

pub use crate::api_facade::{ApiError, ApiFacade};
pub use crate::config::{ConfigValidationError, MirrorConfig};
pub use crate::network::{Mesh, NetworkProfile, Peer, PeerTelemetry};
pub use crate::node::{Node, NodeError};
pub use crate::rpc::{HttpRpcClient, RpcError, RpcTransport};
pub use crate::storage::{BlockStorage, MemoryStorage, SledStorage, StorageError};
pub use crate::sync::{SyncError, SyncEvent, Syncer};
