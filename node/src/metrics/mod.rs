// Metrics for the chain mirror node
//
// Components record through the `metrics` facade; nothing is collected until
// an exporter is installed here.

use crate::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),
    #[error("Exporter error: {0}")]
    Exporter(String),
}

/// Install the Prometheus exporter when enabled. Returns whether one was installed.
pub fn install_exporter(config: &MetricsConfig) -> Result<bool, MetricsError> {
    if !config.enabled {
        return Ok(false);
    }

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|_| MetricsError::InvalidAddress(config.listen_addr.clone()))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Exporter(e.to_string()))?;

    metrics::describe_counter!(
        "chainmirror_sync_fetch_total",
        "Fetch tasks executed, by result"
    );
    metrics::describe_counter!(
        "chainmirror_sync_prune_total",
        "Prune tasks executed, by result"
    );
    metrics::describe_gauge!("chainmirror_sync_queue_length", "Tasks waiting in the sync queue");
    metrics::describe_gauge!("chainmirror_sync_write_pointer", "Highest height admitted for sync");
    metrics::describe_counter!(
        "chainmirror_peer_query_failures_total",
        "Peer RPC calls that failed"
    );

    info!("Prometheus exporter listening on {}", addr);
    Ok(true)
}
