use crate::network::profiles::NetworkProfile;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Locations searched for a configuration file when none is given explicitly.
const DEFAULT_CONFIG_PATHS: &[&str] = &["chainmirror.toml", "config/chainmirror.toml"];

/// Prefix for environment variable overrides, e.g. `CHAINMIRROR__SYNCER__WORKER_COUNT`.
const ENV_PREFIX: &str = "CHAINMIRROR";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unsupported value: {0}")]
    Unsupported(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MirrorConfig {
    pub network: NetworkConfig,
    pub mesh: MeshConfig,
    pub syncer: SyncerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Seed profile used when `endpoints` is empty
    pub profile: NetworkProfile,
    /// Explicit peer endpoints; overrides the profile when non-empty
    pub endpoints: Vec<String>,
    /// Per-request timeout applied by the RPC client
    #[serde(with = "duration_ms")]
    pub rpc_timeout: Duration,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MeshConfig {
    pub start_benchmark_on_init: bool,
    #[serde(with = "duration_ms")]
    pub benchmark_interval: Duration,
    /// Active peers required before the mesh declares itself ready
    pub min_active_peers: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncerConfig {
    pub start_on_init: bool,
    pub min_height: u64,
    pub max_height: Option<u64>,
    /// Copies to keep per height. Only `1` is supported.
    pub block_redundancy: u32,
    pub worker_count: usize,
    #[serde(with = "duration_ms")]
    pub enqueue_interval: Duration,
    #[serde(with = "duration_ms")]
    pub reconcile_interval: Duration,
    pub max_queue_length: usize,
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    /// Failed fetches of one height are retried at most this many times; `None` retries forever
    pub max_retry_attempts: Option<u32>,
    pub missing_priority: u8,
    pub retry_priority: u8,
    pub standard_priority: u8,
    pub prune_priority: u8,
    pub prune_enabled: bool,
    pub prune_chunk_size: usize,
    /// Buffer size of the notification channel handed to observers
    pub event_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub db_path: PathBuf,
    pub cache_capacity: u64,
    pub flush_every_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

/// Durations are written as integer milliseconds in configuration files.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            profile: NetworkProfile::Testnet,
            endpoints: vec![],
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            start_benchmark_on_init: true,
            benchmark_interval: Duration::from_millis(2000),
            min_active_peers: 2,
        }
    }
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            start_on_init: true,
            min_height: 1,
            max_height: None,
            block_redundancy: 1,
            worker_count: 30,
            enqueue_interval: Duration::from_millis(2000),
            reconcile_interval: Duration::from_secs(60),
            max_queue_length: 10_000,
            retry_delay: Duration::from_millis(2000),
            max_retry_attempts: None,
            missing_priority: 1,
            retry_priority: 3,
            standard_priority: 5,
            prune_priority: 7,
            prune_enabled: true,
            prune_chunk_size: 1000,
            event_capacity: 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            db_path: PathBuf::from("./data/blocks"),
            cache_capacity: 256 * 1024 * 1024, // 256MB
            flush_every_ms: Some(1000),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_thread_ids: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9000".to_string(),
        }
    }
}

impl NetworkConfig {
    /// Endpoints the mesh will be built from: explicit ones if given, otherwise the profile seeds.
    pub fn resolve_endpoints(&self) -> Result<Vec<String>, ConfigValidationError> {
        let endpoints: Vec<String> = if self.endpoints.is_empty() {
            self.profile.seed_endpoints().iter().map(|e| e.to_string()).collect()
        } else {
            self.endpoints.clone()
        };

        if endpoints.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "network.endpoints resolved to an empty list".to_string(),
            ));
        }
        for endpoint in &endpoints {
            crate::network::profiles::validate_endpoint(endpoint)?;
        }
        Ok(endpoints)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.rpc_timeout.is_zero() {
            return Err(ConfigValidationError::InvalidValue(
                "network.rpc_timeout must be > 0".to_string(),
            ));
        }
        self.resolve_endpoints().map(|_| ())
    }
}

impl MeshConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.benchmark_interval.is_zero() {
            return Err(ConfigValidationError::InvalidValue(
                "mesh.benchmark_interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl SyncerConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.block_redundancy == 0 {
            return Err(ConfigValidationError::MissingField(
                "syncer.block_redundancy must be supplied".to_string(),
            ));
        }
        if self.block_redundancy != 1 {
            return Err(ConfigValidationError::Unsupported(format!(
                "syncer.block_redundancy {} is not supported, only 1 is accepted",
                self.block_redundancy
            )));
        }
        if let Some(max_height) = self.max_height {
            if max_height < self.min_height {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "syncer.max_height ({max_height}) cannot be below syncer.min_height ({})",
                    self.min_height
                )));
            }
        }
        if self.worker_count == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "syncer.worker_count must be > 0".to_string(),
            ));
        }
        if self.max_queue_length == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "syncer.max_queue_length must be > 0".to_string(),
            ));
        }
        if self.enqueue_interval.is_zero() || self.reconcile_interval.is_zero() {
            return Err(ConfigValidationError::InvalidValue(
                "syncer.enqueue_interval and syncer.reconcile_interval must be > 0".to_string(),
            ));
        }
        if !(self.missing_priority < self.retry_priority
            && self.retry_priority < self.standard_priority)
        {
            return Err(ConfigValidationError::InvalidValue(format!(
                "syncer priorities must satisfy missing < retry < standard, got {} / {} / {}",
                self.missing_priority, self.retry_priority, self.standard_priority
            )));
        }
        if self.prune_enabled && self.prune_chunk_size == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "syncer.prune_chunk_size must be > 0 when pruning is enabled".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "syncer.event_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.backend == StorageBackend::Sled && self.db_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "storage.db_path is required for the sled backend".to_string(),
            ));
        }
        Ok(())
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.enabled && self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "metrics.listen_addr '{}' is not a socket address",
                self.listen_addr
            )));
        }
        Ok(())
    }
}

impl MirrorConfig {
    /// Layer defaults, an optional TOML file and `CHAINMIRROR` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                let found = DEFAULT_CONFIG_PATHS
                    .iter()
                    .map(PathBuf::from)
                    .find(|candidate| candidate.exists());
                match found {
                    Some(candidate) => {
                        info!("Loading configuration from: {:?}", candidate);
                        builder = builder.add_source(File::from(candidate.as_path()));
                    }
                    None => warn!("No configuration file found, using defaults"),
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: MirrorConfig = builder.build()?.try_deserialize()?;
        if let Err(e) = config.validate() {
            return Err(ConfigError::Message(format!(
                "Configuration validation error: {e}"
            )));
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.network.validate()?;
        self.mesh.validate()?;
        self.syncer.validate()?;
        self.storage.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}
