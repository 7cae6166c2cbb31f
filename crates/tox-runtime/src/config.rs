//! `RuntimeConfig`: the typed configuration struct the composition layer
//! accepts at construction (§10.3), mirroring the reference daemon's
//! nested `DaemonConfig` — one sub-struct per subsystem, `#[serde(default
//! = "fn")]` field defaults, and a manual `Default` impl. There is no CLI
//! flag parser or environment-variable override table here; that is the
//! embedding application's job.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, RuntimeError};

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub padding: PaddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Network listen settings and DHT bootstrap nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// `host:port` to bind a UDP transport to. `None` runs against an
    /// in-process [`tox_transport::memory::MemoryTransport`] instead, for
    /// embeddings that wire their own network (tests, simulations).
    #[serde(default)]
    pub listen_addr: Option<String>,
    /// DHT bootstrap nodes, contacted to seed the routing table.
    #[serde(default)]
    pub bootstrap_nodes: Vec<String>,
    /// Address of the pre-key directory / async storage node this
    /// process talks to for offline messaging (§4.5). `None` disables
    /// async messaging.
    #[serde(default)]
    pub async_rendezvous_addr: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            bootstrap_nodes: Vec::new(),
            async_rendezvous_addr: None,
        }
    }
}

/// Retry/backoff tunables for the messaging engine (§4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

/// Traffic-analysis padding toggle. Disabling it is a debugging/testing
/// escape hatch, never recommended in production (§4.2, §9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaddingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Optional SQLite-backed persistence (§6, `tox-db`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file. `None` runs with no persistence
    /// configured; the messaging engine keeps state in memory only.
    #[serde(default)]
    pub data_dir: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: None }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    /// Load configuration from a TOML file. Unlike the reference
    /// daemon's `DaemonConfig::load`, this never falls back to a default
    /// config path search — the embedding application owns locating the
    /// file (§6: no CLI/env plumbing in the core).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RuntimeError::Config(e.to_string()))?;
        toml::from_str(&content).map_err(|e| RuntimeError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| RuntimeError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.retry_interval_ms, 5_000);
        assert!(config.padding.enabled);
        assert!(config.network.listen_addr.is_none());
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = RuntimeConfig::default();
        config.network.bootstrap_nodes = vec!["198.51.100.1:4433".to_string()];
        config.storage.data_dir = Some("/tmp/tox".to_string());

        let toml_str = config.to_toml().expect("serialize");
        let parsed: RuntimeConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.network.bootstrap_nodes, config.network.bootstrap_nodes);
        assert_eq!(parsed.storage.data_dir, config.storage.data_dir);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: RuntimeConfig = toml::from_str("").expect("empty config parses");
        assert_eq!(parsed.retry.max_retries, default_max_retries());
        assert!(parsed.padding.enabled);
    }
}
