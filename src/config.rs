//! Configuration for RingKV
//!
//! Centralized configuration with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::cache::{CacheConfig, CacheStrategy};
use crate::error::Result;

/// Default orchestrator control port
pub const DEFAULT_ORCHESTRATOR_PORT: u16 = 9999;

// =============================================================================
// Storage Node
// =============================================================================

/// Configuration for a storage node
#[derive(Debug, Clone)]
pub struct NodeConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding one file per key
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Strategy and capacity used until the orchestrator says otherwise
    pub cache: CacheConfig,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address for clients; also the node's ring identity
    pub listen_addr: String,

    /// Orchestrator control address; `None` runs the node standalone
    pub orchestrator_addr: Option<String>,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ringkv_data"),
            cache: CacheConfig::default(),
            listen_addr: "127.0.0.1:20010".to_string(),
            orchestrator_addr: None,
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl NodeConfig {
    /// Create a new config builder
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::default()
    }
}

/// Builder for NodeConfig
#[derive(Default)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the cache strategy and capacity
    pub fn cache(mut self, strategy: CacheStrategy, capacity: usize) -> Self {
        self.config.cache = CacheConfig::new(strategy, capacity);
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Register with an orchestrator at this address
    pub fn orchestrator_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.orchestrator_addr = Some(addr.into());
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> NodeConfig {
        self.config
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Configuration for the cluster orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Control port listen address
    pub listen_addr: String,

    /// How long add/remove waits for an in-flight rebalance (milliseconds)
    /// before abandoning it
    pub rebalance_timeout_ms: u64,

    /// Pre-provisioned servers
    pub pool: PoolConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("127.0.0.1:{}", DEFAULT_ORCHESTRATOR_PORT),
            rebalance_timeout_ms: 5000,
            pool: PoolConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a new config builder
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }
}

/// Builder for OrchestratorConfig
#[derive(Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    /// Set the control listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the rebalance wait (in milliseconds)
    pub fn rebalance_timeout_ms(mut self, ms: u64) -> Self {
        self.config.rebalance_timeout_ms = ms;
        self
    }

    /// Set the static server pool
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn build(self) -> OrchestratorConfig {
        self.config
    }
}

// =============================================================================
// Static Pool File
// =============================================================================

/// Static server-pool file
///
/// ```json
/// {
///   "orchestrator": { "address": "127.0.0.1", "port": 9999 },
///   "servers": [
///     { "address": "127.0.0.1", "port": 50000, "cacheSize": 10, "strategy": "FIFO" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub orchestrator: Option<OrchestratorAddress>,

    #[serde(default)]
    pub servers: Vec<PooledServer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorAddress {
    pub address: String,
    pub port: u16,
}

/// One pre-provisioned server and its cache defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PooledServer {
    #[serde(default = "default_address")]
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub cache_size: usize,
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_strategy() -> String {
    "FIFO".to_string()
}

impl PooledServer {
    /// `host:port` identity
    pub fn name(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn cache_config(&self) -> Result<CacheConfig> {
        Ok(CacheConfig::new(
            CacheStrategy::from_str(&self.strategy)?,
            self.cache_size,
        ))
    }
}

impl PoolConfig {
    /// Parse a pool document
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a pool file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Cache defaults for a node identity, if it is pre-provisioned
    pub fn cache_defaults(&self, name: &str) -> Option<CacheConfig> {
        self.servers
            .iter()
            .find(|server| server.name() == name)
            .and_then(|server| server.cache_config().ok())
    }

    /// Orchestrator listen address from the file, if given
    pub fn orchestrator_listen_addr(&self) -> Option<String> {
        self.orchestrator
            .as_ref()
            .map(|o| format!("{}:{}", o.address, o.port))
    }
}
