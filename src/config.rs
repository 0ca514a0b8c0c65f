//! Configuration for promsd
//!
//! Centralized configuration with sensible defaults. Loaded from a YAML file
//! (strict: unknown fields are rejected) or assembled with [`Config::builder`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdError};

/// Main configuration for a promsd instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    // -------------------------------------------------------------------------
    // Store Selection
    // -------------------------------------------------------------------------
    /// Which engine backs the registry
    #[serde(default)]
    pub store_type: StoreType,

    /// Embedded engine settings (used when `store_type: local`)
    #[serde(default)]
    pub local: LocalConfig,

    /// Distributed engine settings (used when `store_type: consul`)
    #[serde(default)]
    pub consul: ConsulConfig,
}

/// Storage engine selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Single-process, file-backed engine
    #[default]
    Local,

    /// Consul-backed engine shared by cooperating instances
    Consul,
}

/// Embedded engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    /// Root directory for all data files
    /// Internal structure:
    ///   {store_path}/
    ///     ├── wal.log         (write-ahead log)
    ///     └── checkpoint.db   (last full snapshot of all partitions)
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Sync strategy: how often to fsync the WAL
    #[serde(default)]
    pub wal_sync: WalSyncStrategy,

    /// Number of logged transactions between checkpoints
    #[serde(default = "default_checkpoint_entries")]
    pub checkpoint_entries: usize,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    #[default]
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Distributed engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsulConfig {
    /// Consul HTTP API address, e.g. `http://127.0.0.1:8500`
    #[serde(default = "default_consul_address")]
    pub address: String,

    /// Datacenter to query (agent default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,

    /// ACL token sent as `X-Consul-Token`; never rendered back out
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Allow any server (not just the leader) to answer reads
    #[serde(default)]
    pub allow_stale: bool,

    /// Prefix under which group records live
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// TTL of the session bound to every group lock
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Upper bound on waiting for a group lock (0 = wait forever)
    #[serde(default = "default_lock_wait_timeout_ms")]
    pub lock_wait_timeout_ms: u64,

    /// Delay between lock acquisition attempts while another writer holds it
    #[serde(default = "default_lock_retry_interval_ms")]
    pub lock_retry_interval_ms: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store_type: StoreType::default(),
            local: LocalConfig::default(),
            consul: ConsulConfig::default(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            wal_sync: WalSyncStrategy::default(),
            checkpoint_entries: default_checkpoint_entries(),
        }
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: default_consul_address(),
            datacenter: None,
            token: None,
            allow_stale: false,
            key_prefix: default_key_prefix(),
            session_ttl_secs: default_session_ttl_secs(),
            lock_wait_timeout_ms: default_lock_wait_timeout_ms(),
            lock_retry_interval_ms: default_lock_retry_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    80
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./promsd_data")
}
fn default_checkpoint_entries() -> usize {
    1000
}
fn default_consul_address() -> String {
    "http://127.0.0.1:8500".into()
}
fn default_key_prefix() -> String {
    "prom-http-sd-server".into()
}
fn default_session_ttl_secs() -> u64 {
    10
}
fn default_lock_wait_timeout_ms() -> u64 {
    5000
}
fn default_lock_retry_interval_ms() -> u64 {
    50
}
fn default_request_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Read and validate a YAML config file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path).map_err(|e| {
            SdError::Config(format!("could not read config {}: {e}", path.display()))
        })?;
        Self::load_from_str(&s)
    }

    /// Parse and validate YAML config text
    pub fn load_from_str(s: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(s)
            .map_err(|e| SdError::Config(format!("could not unmarshal config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Render the effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| SdError::Serialization(e.to_string()))
    }

    /// `host:port` the HTTP server binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(SdError::Config("host must not be empty".into()));
        }
        match self.store_type {
            StoreType::Local => self.local.validate(),
            StoreType::Consul => self.consul.validate(),
        }
    }
}

impl LocalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.store_path.as_os_str().is_empty() {
            return Err(SdError::Config("local.store_path must not be empty".into()));
        }
        if self.checkpoint_entries == 0 {
            return Err(SdError::Config(
                "local.checkpoint_entries must be greater than 0".into(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync {
            return Err(SdError::Config(
                "local.wal_sync.every_n_entries.count must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl ConsulConfig {
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(SdError::Config("consul.address must not be empty".into()));
        }
        let prefix = self.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            return Err(SdError::Config("consul.key_prefix must not be empty".into()));
        }
        // Consul accepts session TTLs between 10s and 24h.
        if !(10..=86_400).contains(&self.session_ttl_secs) {
            return Err(SdError::Config(
                "consul.session_ttl_secs must be between 10 and 86400".into(),
            ));
        }
        if self.lock_retry_interval_ms == 0 {
            return Err(SdError::Config(
                "consul.lock_retry_interval_ms must be greater than 0".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(SdError::Config(
                "consul.request_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Lock wait bound; `None` means wait until granted
    pub fn lock_wait_timeout(&self) -> Option<Duration> {
        match self.lock_wait_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Select the storage engine
    pub fn store_type(mut self, store_type: StoreType) -> Self {
        self.config.store_type = store_type;
        self
    }

    /// Set the data directory of the embedded engine
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.local.store_path = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.local.wal_sync = strategy;
        self
    }

    /// Set the number of logged transactions between checkpoints
    pub fn checkpoint_entries(mut self, count: usize) -> Self {
        self.config.local.checkpoint_entries = count;
        self
    }

    /// Replace the distributed engine settings
    pub fn consul(mut self, consul: ConsulConfig) -> Self {
        self.config.consul = consul;
        self
    }

    /// Set the HTTP listen host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the HTTP listen port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
