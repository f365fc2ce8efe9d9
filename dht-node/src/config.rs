//! Layered configuration: defaults, then an optional TOML file, then
//! `DHT__*` environment overrides, then CLI overrides — the same
//! file-then-env-then-CLI precedence as the teacher's
//! `aggregate_all_package_configs` + `apply_cli_overrides` pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("dht.protocol must be one of chord, koorde, simple (got {0:?})")]
    InvalidProtocol(String),

    #[error("dht.id_bits must be in 1..=128 (got {0})")]
    InvalidIdBits(u32),

    #[error("dht.debruijn.degree {degree} is invalid for id_bits {bits}: {reason}")]
    InvalidDegree { degree: u64, bits: u32, reason: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Chord,
    Koorde,
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapMode {
    Static,
    Discovery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DhtConfig {
    pub id_bits: u32,
    pub protocol: Protocol,
    pub debruijn_degree: u64,
    pub debruijn_fix_interval_ms: u64,
    pub stabilization_interval_ms: u64,
    pub failure_timeout_ms: u64,
    pub successor_list_size: usize,
    pub bootstrap_mode: BootstrapMode,
    pub bootstrap_peers: Vec<String>,
    /// Caps concurrent outbound forwards an inbound `find_successor`/
    /// `find_successor_step` call may issue; beyond this the handler returns
    /// `Overloaded` rather than queuing.
    pub max_concurrent_forwards: usize,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            id_bits: 66,
            protocol: Protocol::Chord,
            debruijn_degree: 4,
            debruijn_fix_interval_ms: 5_000,
            stabilization_interval_ms: 2_000,
            // §9 open question: `1000 + floor(k/4)*500` ms, capped at 5s. A hint, not a contract.
            failure_timeout_ms: 1_000,
            successor_list_size: 8,
            bootstrap_mode: BootstrapMode::Static,
            bootstrap_peers: Vec::new(),
            max_concurrent_forwards: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub http_port: u16,
    pub capacity_mb: u64,
    pub default_ttl_secs: u64,
    pub hotspot_threshold: f64,
    pub hotspot_decay_rate: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            http_port: 8080,
            capacity_mb: 256,
            default_ttl_secs: 300,
            hotspot_threshold: 20.0,
            hotspot_decay_rate: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub bind: String,
    pub host: String,
    pub port: u16,
    pub id_override: Option<String>,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9000,
            id_override: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub dht: DhtConfig,
    pub cache: CacheConfig,
    pub node: NodeSection,
}

impl NodeConfig {
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&NodeConfig::default())?);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("DHT").separator("__"));
        let built = builder.build()?;
        let cfg: NodeConfig = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dht.id_bits == 0 || self.dht.id_bits > 128 {
            return Err(ConfigError::InvalidIdBits(self.dht.id_bits));
        }
        if matches!(self.dht.protocol, Protocol::Koorde) {
            dht_id::Id::validate_degree(self.dht.id_bits, self.dht.debruijn_degree).map_err(|e| {
                ConfigError::InvalidDegree {
                    degree: self.dht.debruijn_degree,
                    bits: self.dht.id_bits,
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    pub fn node_address(&self) -> String {
        format!("{}:{}", self.node.host, self.node.port)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.node.bind, self.node.port)
    }

    pub fn stabilization_interval(&self) -> Duration {
        Duration::from_millis(self.dht.stabilization_interval_ms)
    }

    pub fn failure_timeout(&self) -> Duration {
        // §9: the source's tuning heuristic, carried forward as a default
        // and capped at 5s; not treated as a hard contract.
        let heuristic = 1_000 + (self.dht.debruijn_degree / 4) * 500;
        Duration::from_millis(heuristic.min(5_000).max(self.dht.failure_timeout_ms))
    }

    pub fn cache_capacity_bytes(&self) -> usize {
        (self.cache.capacity_mb * 1024 * 1024) as usize
    }
}
