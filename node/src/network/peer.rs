use crate::rpc::{methods, RpcError, RpcTransport};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Health telemetry observed for one peer.
///
/// Everything is unknown until the first query against the peer completes.
/// Only [`Peer`]'s own query lifecycle writes these fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerTelemetry {
    /// Outcome of the most recent query
    pub is_active: Option<bool>,
    /// Queries dispatched and not yet completed
    pub pending_requests: usize,
    /// Round-trip time of the most recent successful query
    pub latency_ms: Option<u64>,
    /// Chain height reported by the most recent successful height query
    pub height: Option<u64>,
    /// When the most recent query completed, successfully or not
    pub last_seen: Option<DateTime<Utc>>,
}

/// One remote chain RPC endpoint
pub struct Peer {
    endpoint: String,
    transport: Arc<dyn RpcTransport>,
    telemetry: RwLock<PeerTelemetry>,
}

/// Holds one unit of `pending_requests` for the lifetime of a query.
///
/// The unit is returned exactly once: by `finish` when the call completes, or
/// on drop when the query future is abandoned mid-flight.
struct PendingGuard<'a> {
    telemetry: &'a RwLock<PeerTelemetry>,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn begin(telemetry: &'a RwLock<PeerTelemetry>) -> Self {
        telemetry.write().pending_requests += 1;
        Self {
            telemetry,
            armed: true,
        }
    }

    fn finish(mut self, update: impl FnOnce(&mut PeerTelemetry)) {
        let telemetry = self.telemetry;
        let mut t = telemetry.write();
        t.pending_requests = t.pending_requests.saturating_sub(1);
        update(&mut t);
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut t = self.telemetry.write();
            t.pending_requests = t.pending_requests.saturating_sub(1);
        }
    }
}

impl Peer {
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            telemetry: RwLock::new(PeerTelemetry::default()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Snapshot of the current telemetry
    pub fn telemetry(&self) -> PeerTelemetry {
        self.telemetry.read().clone()
    }

    pub fn is_active(&self) -> Option<bool> {
        self.telemetry.read().is_active
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.telemetry.read().latency_ms
    }

    pub fn height(&self) -> Option<u64> {
        self.telemetry.read().height
    }

    pub fn pending_requests(&self) -> usize {
        self.telemetry.read().pending_requests
    }

    /// Fetch the verbose block at `height`
    pub async fn get_block(&self, height: u64) -> Result<Value, RpcError> {
        self.query(methods::GET_BLOCK, json!([height, 1])).await
    }

    /// Fetch the peer's current block count, refreshing its observed height
    pub async fn get_block_count(&self) -> Result<u64, RpcError> {
        let value = self.query(methods::GET_BLOCK_COUNT, json!([])).await?;
        value
            .as_u64()
            .ok_or_else(|| RpcError::InvalidResponse(format!("block count is not an integer: {value}")))
    }

    pub async fn get_version(&self) -> Result<Value, RpcError> {
        self.query(methods::GET_VERSION, json!([])).await
    }

    async fn query(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        debug!("query triggered. endpoint: {} method: {}", self.endpoint, method);
        let guard = PendingGuard::begin(&self.telemetry);
        let started = Instant::now();

        let result = self.transport.call(&self.endpoint, method, params).await;
        let now = Utc::now();

        match &result {
            Ok(value) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                let height = if method == methods::GET_BLOCK_COUNT {
                    value.as_u64()
                } else {
                    None
                };
                guard.finish(|t| {
                    t.is_active = Some(true);
                    t.last_seen = Some(now);
                    t.latency_ms = Some(latency_ms);
                    if height.is_some() {
                        t.height = height;
                    }
                });
            }
            Err(e) => {
                debug!("query failed. endpoint: {} method: {} error: {}", self.endpoint, method, e);
                metrics::counter!("chainmirror_peer_query_failures_total").increment(1);
                guard.finish(|t| {
                    t.is_active = Some(false);
                    t.last_seen = Some(now);
                });
            }
        }

        result
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("endpoint", &self.endpoint)
            .field("telemetry", &*self.telemetry.read())
            .finish()
    }
}
