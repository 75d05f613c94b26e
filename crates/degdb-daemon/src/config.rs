//! Configuration file and CLI flag handling (spec §6).
//!
//! A node's settings come from three layers, lowest to highest
//! precedence: built-in defaults, `$DEGDB_DATA_DIR/config.toml`, and CLI
//! flags. Every field in [`DaemonConfig`] can be set at any layer.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line flags (spec §6: `-port`, `-peers`, `-disk`, `-nodes`).
#[derive(Parser, Debug, Default)]
#[command(name = "degdb", about = "A distributed, p2p, graph database")]
pub struct Cli {
    /// Port to listen on. 0 lets the OS assign one.
    #[arg(long = "port")]
    pub port: Option<u16>,

    /// Comma-separated seed peers to dial on startup, `host:port,host:port`.
    #[arg(long = "peers", value_delimiter = ',')]
    pub peers: Option<Vec<String>>,

    /// Disk budget for local storage, e.g. `1G`. Unused today; reserved
    /// for the storage-quota eviction spec.md leaves unspecified.
    #[arg(long = "disk")]
    pub disk: Option<String>,

    /// Informational node count for this deployment; does not itself
    /// spawn nodes.
    #[arg(long = "nodes")]
    pub nodes: Option<u32>,

    /// Explicit config file path, overriding `$DEGDB_DATA_DIR/config.toml`.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory. Empty = platform default.
    #[arg(long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// 0 = OS-assigned ephemeral port.
    #[serde(default)]
    pub listen_port: u16,
    /// Seed peers dialed on startup.
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    #[serde(default = "default_max_heartbeat_timeouts")]
    pub max_heartbeat_timeouts: u64,
    /// `-1` asks a peer for every peer it knows (spec §4.4).
    #[serde(default = "default_peer_request_limit")]
    pub peer_request_limit: i32,
    /// How often each known peer is bloom-repaired against (spec §4.9).
    /// 0 disables the background anti-entropy task.
    #[serde(default = "default_anti_entropy_interval_secs")]
    pub anti_entropy_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// `-disk` budget string, e.g. `1G`. Advisory only today.
    #[serde(default = "default_disk_budget")]
    pub disk_budget: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_nodes")]
    pub nodes: u32,
}

fn default_heartbeat_interval_secs() -> u64 {
    60
}
fn default_heartbeat_timeout_secs() -> u64 {
    10
}
fn default_max_heartbeat_timeouts() -> u64 {
    3
}
fn default_peer_request_limit() -> i32 {
    -1
}
fn default_anti_entropy_interval_secs() -> u64 {
    300
}
fn default_disk_budget() -> String {
    "1G".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_nodes() -> u32 {
    1
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            peers: Vec::new(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            max_heartbeat_timeouts: default_max_heartbeat_timeouts(),
            peer_request_limit: default_peer_request_limit(),
            anti_entropy_interval_secs: default_anti_entropy_interval_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            disk_budget: default_disk_budget(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            nodes: default_nodes(),
        }
    }
}

impl DaemonConfig {
    /// Load `$DEGDB_DATA_DIR/config.toml` (or `cli.config`, if set),
    /// falling back to defaults, then apply CLI flag overrides.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(Self::default_config_path);
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_cli(cli);
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.network.listen_port = port;
        }
        if let Some(peers) = &cli.peers {
            self.network.peers = peers.clone();
        }
        if let Some(disk) = &cli.disk {
            self.storage.disk_budget = disk.clone();
        }
        if let Some(dir) = &cli.data_dir {
            self.storage.data_dir = dir.to_string_lossy().into_owned();
        }
        if let Some(nodes) = cli.nodes {
            self.advanced.nodes = nodes;
        }
        if let Some(level) = &cli.log_level {
            self.advanced.log_level = level.clone();
        }
    }

    /// The data directory this config resolves to.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    fn default_config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory, `$DEGDB_DATA_DIR` first.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("DEGDB_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/degdb")
        }
        #[cfg(target_os = "windows")]
        {
            dirs_fallback("degdb")
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            dirs_fallback(".degdb")
        }
    }
}

fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/degdb"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_os_assigned_port() {
        let config = DaemonConfig::default();
        assert_eq!(config.network.listen_port, 0);
        assert_eq!(config.network.peer_request_limit, -1);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli {
            port: Some(4100),
            peers: Some(vec!["127.0.0.1:4000".to_string(), "127.0.0.1:4001".to_string()]),
            disk: Some("2G".to_string()),
            nodes: Some(5),
            config: None,
            data_dir: None,
            log_level: Some("debug".to_string()),
        };
        let mut config = DaemonConfig::default();
        config.apply_cli(&cli);
        assert_eq!(config.network.listen_port, 4100);
        assert_eq!(config.network.peers.len(), 2);
        assert_eq!(config.storage.disk_budget, "2G");
        assert_eq!(config.advanced.nodes, 5);
        assert_eq!(config.advanced.log_level, "debug");
    }
}
