//! The managed pool of peers.
//!
//! The mesh owns a fixed set of [`Peer`]s, keeps their telemetry warm with a
//! benchmark loop and answers selection queries (fastest, highest, random)
//! over that telemetry. Selection never mutates anything; all telemetry is
//! written by the peers' own query lifecycle.

use crate::config::{ConfigValidationError, MeshConfig};
use crate::network::peer::Peer;
use crate::rpc::RpcTransport;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

struct BenchmarkHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Mesh {
    peers: Vec<Arc<Peer>>,
    config: MeshConfig,
    ready: AtomicBool,
    ready_tx: watch::Sender<bool>,
    benchmark: Mutex<Option<BenchmarkHandle>>,
}

impl Mesh {
    /// Build a mesh over a fixed peer set. An empty set is a configuration error.
    pub fn new(peers: Vec<Arc<Peer>>, config: MeshConfig) -> Result<Self, ConfigValidationError> {
        if peers.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "mesh must have 1 or more peers".to_string(),
            ));
        }
        config.validate()?;

        let (ready_tx, _) = watch::channel(false);
        debug!("mesh constructed with {} peers", peers.len());
        Ok(Self {
            peers,
            config,
            ready: AtomicBool::new(false),
            ready_tx,
            benchmark: Mutex::new(None),
        })
    }

    pub fn from_endpoints(
        endpoints: &[String],
        transport: Arc<dyn RpcTransport>,
        config: MeshConfig,
    ) -> Result<Self, ConfigValidationError> {
        let peers = endpoints
            .iter()
            .map(|endpoint| Arc::new(Peer::new(endpoint.clone(), Arc::clone(&transport))))
            .collect();
        Self::new(peers, config)
    }

    /// Build the mesh and, if configured, start benchmarking right away.
    pub fn spawn(
        peers: Vec<Arc<Peer>>,
        config: MeshConfig,
    ) -> Result<Arc<Self>, ConfigValidationError> {
        let mesh = Arc::new(Self::new(peers, config)?);
        if mesh.config.start_benchmark_on_init {
            mesh.start_benchmark();
        }
        Ok(mesh)
    }

    pub fn peers(&self) -> &[Arc<Peer>] {
        &self.peers
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Receiver that flips to `true` once, when the mesh becomes ready
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    pub async fn wait_until_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_benchmarking(&self) -> bool {
        self.benchmark.lock().is_some()
    }

    /// Seed telemetry for peers never queried, then probe one random peer per interval.
    pub fn start_benchmark(self: &Arc<Self>) {
        let mut benchmark = self.benchmark.lock();
        if benchmark.is_some() {
            debug!("benchmark already running");
            return;
        }
        debug!("startBenchmark triggered.");

        let unknown: Vec<_> = self
            .peers
            .iter()
            .filter(|peer| peer.is_active().is_none())
            .cloned()
            .collect();
        debug!("unknown peers: {}", unknown.len());
        for peer in unknown {
            let mesh = Arc::clone(self);
            tokio::spawn(async move { mesh.probe(&peer).await });
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let weak = Arc::downgrade(self);
        let period = self.config.benchmark_interval;
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(mesh) = weak.upgrade() else { break };
                        mesh.perform_benchmark();
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("benchmark loop exited");
        });

        *benchmark = Some(BenchmarkHandle { stop_tx, task });
    }

    /// Cancel the benchmark loop. Calling it when nothing runs is a no-op.
    pub fn stop_benchmark(&self) {
        if let Some(handle) = self.benchmark.lock().take() {
            debug!("stopBenchmark triggered.");
            let _ = handle.stop_tx.send(true);
            // Probes already spawned run to completion; the loop itself goes now
            handle.task.abort();
        }
    }

    /// Issue one height query and re-evaluate readiness, whatever the outcome.
    pub async fn probe(&self, peer: &Peer) {
        if let Err(e) = peer.get_block_count().await {
            info!(
                "peer getblockcount error, but to continue... endpoint: {} message: {}",
                peer.endpoint(),
                e
            );
        }
        self.check_ready();
    }

    fn perform_benchmark(self: &Arc<Self>) {
        // Inactive peers stay in the draw so they can recover.
        if let Some(peer) = self.get_random_peer(false) {
            let mesh = Arc::clone(self);
            tokio::spawn(async move { mesh.probe(&peer).await });
        }
    }

    fn check_ready(&self) {
        let active = self.list_active_peers().len();
        if active >= self.config.min_active_peers
            && self
                .ready
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            info!("mesh is considered to be now ready. active peers: {}", active);
            self.ready_tx.send_replace(true);
        }
    }

    pub fn list_active_peers(&self) -> Vec<Arc<Peer>> {
        self.peers
            .iter()
            .filter(|peer| peer.is_active() == Some(true))
            .cloned()
            .collect()
    }

    fn pool(&self, active_only: bool) -> Vec<Arc<Peer>> {
        if active_only {
            self.list_active_peers()
        } else {
            self.peers.clone()
        }
    }

    /// Lowest known latency; the first minimum wins ties.
    pub fn get_fastest_peer(&self, active_only: bool) -> Option<Arc<Peer>> {
        let mut best: Option<(u64, Arc<Peer>)> = None;
        for peer in self.pool(active_only) {
            if let Some(latency) = peer.latency_ms() {
                if best.as_ref().map_or(true, |(min, _)| latency < *min) {
                    best = Some((latency, peer));
                }
            }
        }
        best.map(|(_, peer)| peer)
    }

    /// Highest observed chain height; the first maximum wins ties.
    pub fn get_highest_peer(&self, active_only: bool) -> Option<Arc<Peer>> {
        let mut best: Option<(u64, Arc<Peer>)> = None;
        for peer in self.pool(active_only) {
            if let Some(height) = peer.height() {
                if best.as_ref().map_or(true, |(max, _)| height > *max) {
                    best = Some((height, peer));
                }
            }
        }
        best.map(|(_, peer)| peer)
    }

    pub fn get_random_peer(&self, active_only: bool) -> Option<Arc<Peer>> {
        let pool = self.pool(active_only);
        if pool.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..pool.len());
        Some(Arc::clone(&pool[index]))
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.stop_benchmark();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{methods, ScriptedEndpoint, ScriptedTransport};
    use std::time::Duration;

    fn endpoints(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("http://peer-{i}:10332")).collect()
    }

    fn mesh_over(transport: Arc<ScriptedTransport>, n: usize, config: MeshConfig) -> Arc<Mesh> {
        Arc::new(Mesh::from_endpoints(&endpoints(n), transport, config).unwrap())
    }

    fn quiet_config() -> MeshConfig {
        MeshConfig {
            start_benchmark_on_init: false,
            ..MeshConfig::default()
        }
    }

    async fn probe_all(mesh: &Mesh) {
        for peer in mesh.peers().to_vec() {
            mesh.probe(&peer).await;
        }
    }

    #[test]
    fn empty_peer_set_is_rejected() {
        assert!(Mesh::new(vec![], MeshConfig::default()).is_err());
    }

    #[test]
    fn selections_on_unknown_telemetry_return_none() {
        let mesh = mesh_over(Arc::new(ScriptedTransport::new()), 3, quiet_config());

        assert!(mesh.get_fastest_peer(true).is_none());
        assert!(mesh.get_highest_peer(true).is_none());
        assert!(mesh.get_random_peer(true).is_none());

        // The full pool is non-empty, but nothing is measured yet
        assert!(mesh.get_fastest_peer(false).is_none());
        assert!(mesh.get_highest_peer(false).is_none());
        assert!(mesh.get_random_peer(false).is_some());
    }

    #[tokio::test]
    async fn highest_peer_is_the_only_responder() {
        let eps = endpoints(3);
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_endpoint(&eps[0], ScriptedEndpoint::unreachable())
                .with_endpoint(&eps[1], ScriptedEndpoint::at_height(100))
                .with_endpoint(&eps[2], ScriptedEndpoint::unreachable()),
        );
        let mesh = mesh_over(transport, 3, quiet_config());
        probe_all(&mesh).await;

        let highest = mesh.get_highest_peer(true).unwrap();
        assert_eq!(highest.endpoint(), eps[1]);
        assert_eq!(mesh.list_active_peers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fastest_peer_uses_lowest_latency() {
        let eps = endpoints(3);
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_endpoint(
                    &eps[0],
                    ScriptedEndpoint::at_height(10).with_latency(Duration::from_millis(50)),
                )
                .with_endpoint(
                    &eps[1],
                    ScriptedEndpoint::at_height(12).with_latency(Duration::from_millis(10)),
                )
                .with_endpoint(
                    &eps[2],
                    ScriptedEndpoint::at_height(11).with_latency(Duration::from_millis(30)),
                ),
        );
        let mesh = mesh_over(transport, 3, quiet_config());
        probe_all(&mesh).await;

        assert_eq!(mesh.get_fastest_peer(true).unwrap().endpoint(), eps[1]);
        assert_eq!(mesh.get_highest_peer(true).unwrap().endpoint(), eps[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn ties_resolve_to_first_peer() {
        let eps = endpoints(2);
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_endpoint(
                    &eps[0],
                    ScriptedEndpoint::at_height(20).with_latency(Duration::from_millis(5)),
                )
                .with_endpoint(
                    &eps[1],
                    ScriptedEndpoint::at_height(20).with_latency(Duration::from_millis(5)),
                ),
        );
        let mesh = mesh_over(transport, 2, quiet_config());
        probe_all(&mesh).await;

        assert_eq!(mesh.get_fastest_peer(true).unwrap().endpoint(), eps[0]);
        assert_eq!(mesh.get_highest_peer(true).unwrap().endpoint(), eps[0]);
    }

    #[tokio::test]
    async fn inactive_peers_are_excluded_unless_requested() {
        let eps = endpoints(2);
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_endpoint(&eps[0], ScriptedEndpoint::at_height(500))
                .with_endpoint(&eps[1], ScriptedEndpoint::at_height(400)),
        );
        let mesh = mesh_over(transport.clone(), 2, quiet_config());
        probe_all(&mesh).await;

        transport.set_unreachable(&eps[0], true);
        mesh.probe(&mesh.peers()[0].clone()).await;

        // Peer 1 keeps its last observed height but is no longer active
        assert_eq!(mesh.get_highest_peer(true).unwrap().endpoint(), eps[1]);
        assert_eq!(mesh.get_highest_peer(false).unwrap().endpoint(), eps[0]);
    }

    #[tokio::test]
    async fn readiness_latches_once_threshold_is_crossed() {
        let eps = endpoints(3);
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_endpoint(&eps[0], ScriptedEndpoint::at_height(1))
                .with_endpoint(&eps[1], ScriptedEndpoint::at_height(1))
                .with_endpoint(&eps[2], ScriptedEndpoint::unreachable()),
        );
        let mesh = mesh_over(transport.clone(), 3, quiet_config());
        let mut ready_rx = mesh.subscribe_ready();

        mesh.probe(&mesh.peers()[0].clone()).await;
        assert!(!mesh.is_ready());

        mesh.probe(&mesh.peers()[1].clone()).await;
        assert!(mesh.is_ready());
        assert!(ready_rx.has_changed().unwrap());
        assert!(*ready_rx.borrow_and_update());

        // Everyone goes down; readiness stays latched
        transport.set_unreachable(&eps[0], true);
        transport.set_unreachable(&eps[1], true);
        probe_all(&mesh).await;
        assert!(mesh.list_active_peers().is_empty());
        assert!(mesh.is_ready());
        assert!(!ready_rx.has_changed().unwrap());

        mesh.wait_until_ready().await;
    }

    #[tokio::test]
    async fn readiness_is_checked_after_failed_queries_too() {
        let eps = endpoints(1);
        let transport =
            Arc::new(ScriptedTransport::new().with_endpoint(&eps[0], ScriptedEndpoint::unreachable()));
        let config = MeshConfig {
            min_active_peers: 0,
            ..quiet_config()
        };
        let mesh = mesh_over(transport, 1, config);

        mesh.probe(&mesh.peers()[0].clone()).await;
        assert!(mesh.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn benchmark_seeds_then_probes_until_stopped() {
        let eps = endpoints(2);
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_endpoint(&eps[0], ScriptedEndpoint::at_height(30))
                .with_endpoint(&eps[1], ScriptedEndpoint::unreachable()),
        );
        let config = MeshConfig {
            benchmark_interval: Duration::from_millis(100),
            min_active_peers: 1,
            ..MeshConfig::default()
        };
        let mesh = Mesh::spawn(
            endpoints(2)
                .into_iter()
                .map(|ep| Arc::new(Peer::new(ep, transport.clone() as Arc<dyn RpcTransport>)))
                .collect(),
            config,
        )
        .unwrap();
        assert!(mesh.is_benchmarking());

        mesh.wait_until_ready().await;
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(mesh.peers()[1].is_active(), Some(false));

        // The unreachable peer recovers through the random benchmark draw
        transport.set_unreachable(&eps[1], false);
        transport.set_height(&eps[1], Some(31));
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(mesh.peers()[1].is_active(), Some(true));
        assert_eq!(mesh.get_highest_peer(true).unwrap().endpoint(), eps[1]);

        mesh.stop_benchmark();
        mesh.stop_benchmark();
        assert!(!mesh.is_benchmarking());

        let calls = transport.call_count(&eps[0], methods::GET_BLOCK_COUNT)
            + transport.call_count(&eps[1], methods::GET_BLOCK_COUNT);
        time::sleep(Duration::from_secs(5)).await;
        let calls_after = transport.call_count(&eps[0], methods::GET_BLOCK_COUNT)
            + transport.call_count(&eps[1], methods::GET_BLOCK_COUNT);
        assert_eq!(calls, calls_after);
    }

    #[tokio::test(start_paused = true)]
    async fn benchmark_restarts_after_stop() {
        let eps = endpoints(1);
        let transport =
            Arc::new(ScriptedTransport::new().with_endpoint(&eps[0], ScriptedEndpoint::at_height(3)));
        let config = MeshConfig {
            benchmark_interval: Duration::from_millis(100),
            min_active_peers: 1,
            ..MeshConfig::default()
        };
        let mesh = Mesh::spawn(
            eps.iter()
                .map(|ep| Arc::new(Peer::new(ep.clone(), transport.clone() as Arc<dyn RpcTransport>)))
                .collect(),
            config,
        )
        .unwrap();
        mesh.wait_until_ready().await;
        mesh.stop_benchmark();

        let stopped_at = transport.call_count(&eps[0], methods::GET_BLOCK_COUNT);
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.call_count(&eps[0], methods::GET_BLOCK_COUNT), stopped_at);

        mesh.start_benchmark();
        assert!(mesh.is_benchmarking());
        time::sleep(Duration::from_secs(1)).await;
        assert!(transport.call_count(&eps[0], methods::GET_BLOCK_COUNT) > stopped_at);
        mesh.stop_benchmark();
    }
}
