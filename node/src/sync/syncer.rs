//! Block synchronization engine.
//!
//! The engine owns a bounded priority queue and a write pointer. Three
//! independent loops cooperate while it runs:
//!
//! - the enqueue loop extends the write pointer toward the highest peer,
//! - the reconciliation loop scans storage for gaps and over-replication,
//! - a fixed pool of workers drains the queue.
//!
//! Every executed task produces a [`TaskOutcome`] that feeds the retry logic,
//! and lifecycle changes are published as [`SyncEvent`]s.

use crate::config::{ConfigValidationError, SyncerConfig};
use crate::network::Mesh;
use crate::rpc::RpcError;
use crate::storage::{BlockStorage, StorageError};
use crate::sync::events::{SyncEvent, TaskOutcome};
use crate::sync::queue::{Priority, QueuedTask, Task, TaskQueue};
use crate::sync::reconcile::{self, ReconciliationReport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No peer available")]
    NoPeerAvailable,
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// State guarded together: every pointer move and every push happen under one lock.
struct Schedule {
    write_pointer: u64,
    queue: TaskQueue,
    failed_attempts: HashMap<u64, u32>,
}

#[derive(Default)]
struct Lifecycle {
    stop_tx: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

struct SyncerInner<S: ?Sized> {
    config: SyncerConfig,
    mesh: Arc<Mesh>,
    storage: Arc<S>,
    schedule: Mutex<Schedule>,
    task_ready: Notify,
    running: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

pub struct Syncer<S: BlockStorage + ?Sized + 'static> {
    inner: Arc<SyncerInner<S>>,
}

impl<S: BlockStorage + ?Sized + 'static> Syncer<S> {
    /// Build a stopped engine. Unsupported settings are rejected here.
    pub fn new(
        mesh: Arc<Mesh>,
        storage: Arc<S>,
        config: SyncerConfig,
    ) -> Result<Self, ConfigValidationError> {
        config.validate()?;

        let (events, _) = broadcast::channel(config.event_capacity);
        let write_pointer = config.min_height.saturating_sub(1);
        debug!("syncer constructed. min_height: {} workers: {}", config.min_height, config.worker_count);

        Ok(Self {
            inner: Arc::new(SyncerInner {
                schedule: Mutex::new(Schedule {
                    write_pointer,
                    queue: TaskQueue::new(),
                    failed_attempts: HashMap::new(),
                }),
                config,
                mesh,
                storage,
                task_ready: Notify::new(),
                running: AtomicBool::new(false),
                events,
                lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            }),
        })
    }

    pub fn config(&self) -> &SyncerConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn write_pointer(&self) -> u64 {
        self.inner.schedule.lock().write_pointer
    }

    pub fn queue_len(&self) -> usize {
        self.inner.schedule.lock().queue.len()
    }

    /// Queued tasks in serve order
    pub fn queued_tasks(&self) -> Vec<QueuedTask> {
        self.inner.schedule.lock().queue.snapshot()
    }

    /// Start the loops and the worker pool. Starting a running engine is a no-op.
    pub async fn start(&self) {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock().await;
        if inner.running.load(Ordering::SeqCst) {
            info!("syncer is already running");
            return;
        }
        info!("syncer starting");

        inner.initialize_write_pointer().await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(inner.config.worker_count + 2);

        handles.push(tokio::spawn(enqueue_loop(
            Arc::clone(inner),
            stop_rx.clone(),
        )));
        handles.push(tokio::spawn(reconcile_loop(
            Arc::clone(inner),
            stop_rx.clone(),
        )));
        for worker_id in 0..inner.config.worker_count {
            handles.push(tokio::spawn(worker_loop(
                Arc::clone(inner),
                worker_id,
                stop_rx.clone(),
            )));
        }

        lifecycle.stop_tx = Some(stop_tx);
        lifecycle.handles = handles;
        inner.running.store(true, Ordering::SeqCst);
        inner.emit(SyncEvent::Started);
    }

    /// Stop both timers and let the workers finish what they hold.
    ///
    /// Queued tasks stay queued but are not picked up until the next start.
    /// Stopping a stopped engine is a no-op.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock().await;
        if !inner.running.load(Ordering::SeqCst) {
            info!("syncer is not running");
            return;
        }
        info!("syncer stopping");

        if let Some(stop_tx) = lifecycle.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        for handle in lifecycle.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("syncer task ended abnormally: {}", e);
            }
        }

        inner.running.store(false, Ordering::SeqCst);
        inner.emit(SyncEvent::Stopped);
    }

    /// Seed the write pointer from storage, never moving it backwards.
    pub async fn initialize_write_pointer(&self) -> u64 {
        self.inner.initialize_write_pointer().await
    }

    /// One pass of the incremental enqueue loop. Returns how many heights were admitted.
    pub fn enqueue_tick(&self) -> usize {
        self.inner.enqueue_tick()
    }

    /// One reconciliation scan
    pub async fn reconcile(&self) -> Result<ReconciliationReport, SyncError> {
        self.inner.reconcile().await
    }

    /// Queue a fetch, pulling the write pointer up to `height` if it is ahead
    pub fn enqueue_fetch(&self, height: u64, priority: Priority) {
        self.inner.enqueue_fetch(height, priority)
    }

    pub fn enqueue_prune(&self, height: u64, keep: u32) {
        self.inner.enqueue_prune(height, keep)
    }

    /// Fetch `height` from the fastest active peer and store it
    pub async fn run_fetch_task(&self, height: u64) -> Result<(), SyncError> {
        self.inner.run_fetch_task(height).await
    }

    pub async fn run_prune_task(&self, height: u64, keep: u32) -> Result<(), SyncError> {
        self.inner.run_prune_task(height, keep).await
    }

    /// Execute one task as a worker would, including completion handling
    pub async fn execute(&self, task: Task) -> TaskOutcome {
        self.inner.execute(task).await
    }
}

impl<S: BlockStorage + ?Sized + 'static> Drop for Syncer<S> {
    fn drop(&mut self) {
        // Loops hold the inner state alive; signal them so it can be released
        if let Ok(mut lifecycle) = self.inner.lifecycle.try_lock() {
            if let Some(stop_tx) = lifecycle.stop_tx.take() {
                let _ = stop_tx.send(true);
            }
        }
    }
}

impl<S: BlockStorage + ?Sized + 'static> SyncerInner<S> {
    fn emit(&self, event: SyncEvent) {
        debug!("sync event: {}", event);
        let _ = self.events.send(event);
    }

    fn record_schedule_gauges(&self, write_pointer: u64, queue_len: usize) {
        metrics::gauge!("chainmirror_sync_write_pointer").set(write_pointer as f64);
        metrics::gauge!("chainmirror_sync_queue_length").set(queue_len as f64);
    }

    async fn initialize_write_pointer(&self) -> u64 {
        let floor = self.config.min_height.saturating_sub(1);
        let seeded = match self.storage.current_height().await {
            Ok(height) => height.max(floor),
            Err(e) => {
                warn!("unable to read storage height, starting from minimum: {}", e);
                floor
            }
        };

        let mut schedule = self.schedule.lock();
        schedule.write_pointer = schedule.write_pointer.max(seeded);
        info!("write pointer initialized to {}", schedule.write_pointer);
        schedule.write_pointer
    }

    fn enqueue_tick(&self) -> usize {
        let max_height = self.config.max_height;
        if let Some(max) = max_height {
            if self.schedule.lock().write_pointer >= max {
                debug!("max height {} reached, nothing to enqueue", max);
                return 0;
            }
        }

        let target = match self.mesh.get_highest_peer(true).and_then(|peer| peer.height()) {
            Some(height) => height,
            None => {
                error!("no active peer with a known height, skipping enqueue");
                return 0;
            }
        };

        let priority = self.config.standard_priority;
        let (admitted, write_pointer, queue_len) = {
            let mut schedule = self.schedule.lock();
            let mut admitted = Vec::new();
            while schedule.write_pointer < target
                && max_height.map_or(true, |max| schedule.write_pointer < max)
                && schedule.queue.len() < self.config.max_queue_length
            {
                schedule.write_pointer += 1;
                let height = schedule.write_pointer;
                schedule.queue.push(Task::Fetch { height }, priority);
                admitted.push(height);
            }
            (admitted, schedule.write_pointer, schedule.queue.len())
        };

        if !admitted.is_empty() {
            debug!(
                "enqueued {} heights, write pointer now {}",
                admitted.len(),
                write_pointer
            );
        }
        for &height in &admitted {
            self.task_ready.notify_one();
            self.emit(SyncEvent::FetchEnqueued { height, priority });
        }
        self.record_schedule_gauges(write_pointer, queue_len);
        admitted.len()
    }

    async fn reconcile(&self) -> Result<ReconciliationReport, SyncError> {
        let write_pointer = self.schedule.lock().write_pointer;
        let start = self.config.min_height;
        let end = self
            .config
            .max_height
            .map_or(write_pointer, |max| write_pointer.min(max));

        let histogram = if start <= end {
            self.storage.redundancy_histogram(start, end).await?
        } else {
            Default::default()
        };
        let report = reconcile::analyze(start, end, &histogram, self.config.block_redundancy);
        debug!(
            "reconciliation over [{}, {}]: missing {} excessive {} insufficient {}",
            start,
            end,
            report.missing.len(),
            report.excessive.len(),
            report.insufficient.len()
        );

        if !report.missing.is_empty() {
            self.emit(SyncEvent::MissingDetected {
                count: report.missing.len(),
            });
            for &height in &report.missing {
                self.enqueue_fetch(height, self.config.missing_priority);
            }
        }

        if !report.excessive.is_empty() {
            self.emit(SyncEvent::ExcessiveDetected {
                count: report.excessive.len(),
            });
            if self.config.prune_enabled {
                for &height in report.excessive.iter().take(self.config.prune_chunk_size) {
                    self.enqueue_prune(height, self.config.block_redundancy);
                }
            }
        }

        if !report.insufficient.is_empty() {
            debug!(
                "{} heights below the redundancy target, left as is",
                report.insufficient.len()
            );
        }

        let peer_height = self
            .mesh
            .get_highest_peer(true)
            .and_then(|peer| peer.height());
        if report.missing.is_empty() && peer_height.map_or(false, |height| height <= write_pointer) {
            self.emit(SyncEvent::UpToDate);
        }

        Ok(report)
    }

    fn enqueue_fetch(&self, height: u64, priority: Priority) {
        let (write_pointer, queue_len) = {
            let mut schedule = self.schedule.lock();
            if height > schedule.write_pointer {
                schedule.write_pointer = height;
            }
            schedule.queue.push(Task::Fetch { height }, priority);
            (schedule.write_pointer, schedule.queue.len())
        };
        self.task_ready.notify_one();
        self.emit(SyncEvent::FetchEnqueued { height, priority });
        self.record_schedule_gauges(write_pointer, queue_len);
    }

    fn enqueue_prune(&self, height: u64, keep: u32) {
        let mut schedule = self.schedule.lock();
        schedule
            .queue
            .push(Task::Prune { height, keep }, self.config.prune_priority);
        drop(schedule);
        self.task_ready.notify_one();
    }

    fn next_task(&self) -> Option<QueuedTask> {
        self.schedule.lock().queue.pop()
    }

    async fn run_fetch_task(&self, height: u64) -> Result<(), SyncError> {
        let peer = self
            .mesh
            .get_fastest_peer(true)
            .ok_or(SyncError::NoPeerAvailable)?;
        let block = peer.get_block(height).await?;
        self.storage
            .put_block(height, &block, peer.endpoint())
            .await?;
        Ok(())
    }

    async fn run_prune_task(&self, height: u64, keep: u32) -> Result<(), SyncError> {
        self.storage.prune_block(height, keep).await?;
        Ok(())
    }

    async fn execute(self: &Arc<Self>, task: Task) -> TaskOutcome {
        let success = match task {
            Task::Fetch { height } => {
                self.emit(SyncEvent::FetchStarted { height });
                let result = self.run_fetch_task(height).await;
                if let Err(e) = &result {
                    debug!("fetch failed. height: {} error: {}", height, e);
                }
                let success = result.is_ok();
                metrics::counter!(
                    "chainmirror_sync_fetch_total",
                    "result" => if success { "success" } else { "failure" }
                )
                .increment(1);
                self.emit(SyncEvent::FetchCompleted { height, success });
                success
            }
            Task::Prune { height, keep } => {
                let result = self.run_prune_task(height, keep).await;
                if let Err(e) = &result {
                    warn!("prune failed. height: {} error: {}", height, e);
                }
                let success = result.is_ok();
                metrics::counter!(
                    "chainmirror_sync_prune_total",
                    "result" => if success { "success" } else { "failure" }
                )
                .increment(1);
                self.emit(SyncEvent::PruneCompleted { height, success });
                success
            }
        };

        let outcome = TaskOutcome { task, success };
        self.handle_outcome(outcome);
        outcome
    }

    /// Only failed fetches are acted on: they come back at retry priority after the delay.
    fn handle_outcome(self: &Arc<Self>, outcome: TaskOutcome) {
        let Task::Fetch { height } = outcome.task else {
            return;
        };

        if outcome.success {
            self.schedule.lock().failed_attempts.remove(&height);
            return;
        }

        let attempts = {
            let mut schedule = self.schedule.lock();
            let attempts = schedule.failed_attempts.entry(height).or_insert(0);
            *attempts += 1;
            *attempts
        };
        if let Some(cap) = self.config.max_retry_attempts {
            if attempts > cap {
                warn!("giving up on height {} after {} retries", height, cap);
                self.schedule.lock().failed_attempts.remove(&height);
                self.emit(SyncEvent::RetryExhausted { height });
                return;
            }
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.config.retry_delay;
        tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                debug!("retrying height {}", height);
                inner.enqueue_fetch(height, inner.config.retry_priority);
            }
        });
    }
}

async fn enqueue_loop<S: BlockStorage + ?Sized + 'static>(
    inner: Arc<SyncerInner<S>>,
    mut stop: watch::Receiver<bool>,
) {
    let period = inner.config.enqueue_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                inner.enqueue_tick();
            }
            _ = stop.changed() => break,
        }
    }
    debug!("enqueue loop exited");
}

async fn reconcile_loop<S: BlockStorage + ?Sized + 'static>(
    inner: Arc<SyncerInner<S>>,
    mut stop: watch::Receiver<bool>,
) {
    let period = inner.config.reconcile_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = inner.reconcile().await {
                    warn!("reconciliation failed: {}", e);
                }
            }
            _ = stop.changed() => break,
        }
    }
    debug!("reconciliation loop exited");
}

async fn worker_loop<S: BlockStorage + ?Sized + 'static>(
    inner: Arc<SyncerInner<S>>,
    worker_id: usize,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }
        match inner.next_task() {
            Some(queued) => {
                inner.execute(queued.task).await;
            }
            None => {
                tokio::select! {
                    _ = inner.task_ready.notified() => {}
                    _ = stop.changed() => break,
                }
            }
        }
    }
    debug!("worker {} exited", worker_id);
}

static_assertions::assert_impl_all!(Syncer<dyn BlockStorage>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;
    use crate::network::Peer;
    use crate::rpc::{ScriptedEndpoint, ScriptedTransport};
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::time::Duration;

    const PEER: &str = "http://peer-a:10332";

    async fn fixture(
        script: ScriptedEndpoint,
        config: SyncerConfig,
    ) -> (Syncer<MemoryStorage>, Arc<MemoryStorage>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new().with_endpoint(PEER, script));
        let peer = Arc::new(Peer::new(PEER, transport.clone()));
        let mesh = Arc::new(
            Mesh::new(
                vec![peer],
                MeshConfig {
                    start_benchmark_on_init: false,
                    min_active_peers: 1,
                    ..MeshConfig::default()
                },
            )
            .unwrap(),
        );
        for peer in mesh.peers().to_vec() {
            mesh.probe(&peer).await;
        }
        let storage = Arc::new(MemoryStorage::new());
        let syncer = Syncer::new(mesh, storage.clone(), config).unwrap();
        (syncer, storage, transport)
    }

    #[tokio::test]
    async fn rejects_unsupported_redundancy() {
        let transport = Arc::new(ScriptedTransport::new());
        let mesh = Arc::new(
            Mesh::from_endpoints(&[PEER.to_string()], transport, MeshConfig::default()).unwrap(),
        );
        let config = SyncerConfig {
            block_redundancy: 2,
            ..SyncerConfig::default()
        };
        assert!(matches!(
            Syncer::new(mesh, Arc::new(MemoryStorage::new()), config),
            Err(ConfigValidationError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn write_pointer_starts_from_stored_height() {
        let (syncer, storage, _) = fixture(ScriptedEndpoint::at_height(50), SyncerConfig::default()).await;
        assert_eq!(syncer.write_pointer(), 0);

        storage.put_block(12, &json!({}), PEER).await.unwrap();
        assert_eq!(syncer.initialize_write_pointer().await, 12);

        // Never moves backwards
        syncer.enqueue_fetch(30, 5);
        assert_eq!(syncer.initialize_write_pointer().await, 30);
    }

    #[tokio::test]
    async fn write_pointer_respects_min_height_floor() {
        let config = SyncerConfig {
            min_height: 100,
            ..SyncerConfig::default()
        };
        let (syncer, storage, _) = fixture(ScriptedEndpoint::at_height(150), config).await;
        storage.put_block(3, &json!({}), PEER).await.unwrap();
        assert_eq!(syncer.initialize_write_pointer().await, 99);

        assert_eq!(syncer.enqueue_tick(), 51);
        assert_eq!(syncer.queued_tasks()[0].task, Task::Fetch { height: 100 });
    }

    #[tokio::test]
    async fn enqueue_tick_stops_at_max_height() {
        let config = SyncerConfig {
            max_height: Some(3),
            ..SyncerConfig::default()
        };
        let (syncer, _, _) = fixture(ScriptedEndpoint::at_height(10), config).await;

        assert_eq!(syncer.enqueue_tick(), 3);
        assert_eq!(syncer.write_pointer(), 3);
        assert_eq!(syncer.enqueue_tick(), 0);
    }

    #[tokio::test]
    async fn enqueue_tick_without_peers_makes_no_progress() {
        let (syncer, _, transport) = fixture(ScriptedEndpoint::at_height(10), SyncerConfig::default()).await;
        transport.set_unreachable(PEER, true);
        syncer.inner.mesh.probe(&syncer.inner.mesh.peers()[0].clone()).await;

        assert_eq!(syncer.enqueue_tick(), 0);
        assert_eq!(syncer.write_pointer(), 0);
        assert_eq!(syncer.queue_len(), 0);
    }

    #[tokio::test]
    async fn fetch_task_stores_block_with_provenance() {
        let (syncer, storage, _) = fixture(ScriptedEndpoint::at_height(10), SyncerConfig::default()).await;
        let mut events = syncer.subscribe();

        let outcome = syncer.execute(Task::Fetch { height: 4 }).await;
        assert!(outcome.success);

        let copies = storage.copies(4);
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].source, PEER);
        assert_eq!(copies[0].payload["index"], json!(4));

        assert_eq!(events.recv().await.unwrap(), SyncEvent::FetchStarted { height: 4 });
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::FetchCompleted {
                height: 4,
                success: true
            }
        );
    }

    #[tokio::test]
    async fn fetch_without_active_peer_fails_fast() {
        let (syncer, _, transport) = fixture(ScriptedEndpoint::at_height(10), SyncerConfig::default()).await;
        transport.set_unreachable(PEER, true);
        syncer.inner.mesh.probe(&syncer.inner.mesh.peers()[0].clone()).await;

        assert!(matches!(
            syncer.run_fetch_task(2).await,
            Err(SyncError::NoPeerAvailable)
        ));
    }

    #[tokio::test]
    async fn prune_task_reduces_copies() {
        let (syncer, storage, _) = fixture(ScriptedEndpoint::at_height(10), SyncerConfig::default()).await;
        for source in ["a", "b", "c"] {
            storage.put_block(6, &json!({}), source).await.unwrap();
        }

        let outcome = syncer.execute(Task::Prune { height: 6, keep: 1 }).await;
        assert!(outcome.success);
        assert_eq!(storage.copies(6).len(), 1);
        // Prune outcomes never schedule retries
        assert_eq!(syncer.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_cap_emits_exhaustion() {
        let config = SyncerConfig {
            max_retry_attempts: Some(1),
            retry_delay: Duration::from_millis(100),
            ..SyncerConfig::default()
        };
        let (syncer, _, _) = fixture(ScriptedEndpoint::at_height(10), config).await;
        let mut events = syncer.subscribe();

        // Height above the peer tip: every fetch fails
        syncer.execute(Task::Fetch { height: 20 }).await;
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(syncer.queue_len(), 1);

        let retry = syncer.inner.next_task().unwrap();
        assert_eq!(retry.priority, syncer.config().retry_priority);
        syncer.execute(retry.task).await;
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(syncer.queue_len(), 0);

        let mut exhausted = false;
        while let Ok(event) = events.try_recv() {
            if event == (SyncEvent::RetryExhausted { height: 20 }) {
                exhausted = true;
            }
        }
        assert!(exhausted);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let config = SyncerConfig {
            worker_count: 2,
            ..SyncerConfig::default()
        };
        let (syncer, _, _) = fixture(ScriptedEndpoint::at_height(10), config).await;
        let mut events = syncer.subscribe();

        syncer.start().await;
        syncer.start().await;
        assert!(syncer.is_running());

        syncer.stop().await;
        syncer.stop().await;
        assert!(!syncer.is_running());

        assert_eq!(events.recv().await.unwrap(), SyncEvent::Started);
        assert_eq!(events.recv().await.unwrap(), SyncEvent::Stopped);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn running_engine_mirrors_the_peer() {
        let config = SyncerConfig {
            worker_count: 4,
            enqueue_interval: Duration::from_millis(100),
            reconcile_interval: Duration::from_secs(5),
            ..SyncerConfig::default()
        };
        let (syncer, storage, _) = fixture(ScriptedEndpoint::at_height(25), config).await;

        syncer.start().await;
        time::sleep(Duration::from_secs(1)).await;
        syncer.stop().await;

        let histogram = storage.redundancy_histogram(1, 25).await.unwrap();
        assert_eq!(histogram.len(), 25);
        assert_eq!(syncer.write_pointer(), 25);
        assert_eq!(syncer.queue_len(), 0);
    }
}
