//! Configuration system for the CBC.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CBC_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/cbc/config.toml
//!   3. ~/.config/cbc/config.toml

use crate::peer::{PeerProtocol, UnknownPeerPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CbcConfig {
    pub cbc: CbcSection,
    pub peers: Vec<PeerConfig>,
    pub network: NetworkConfig,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CbcSection {
    /// Whether connections from unconfigured addresses become peers.
    pub unknown_peers: UnknownPeerPolicy,
}

/// One configured RAN peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub name: String,
    pub remote_ip: Option<String>,
    /// Unset = identify the peer by IP only.
    #[serde(default)]
    pub remote_port: Option<u16>,
    #[serde(default)]
    pub protocol: PeerProtocol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_addr: String,
    /// REST API (ECBE) port.
    pub api_port: u16,
    /// CBSP listen port. 0 = OS-assigned.
    pub cbsp_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Operations that may wait for the owner thread at once.
    pub queue_capacity: usize,
    pub op_timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            api_port: 12345,
            cbsp_port: 48049,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            op_timeout_secs: 10,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("cbc")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("duplicate peer name '{0}'")]
    DuplicatePeer(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CbcConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read one file without env overrides. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config: CbcConfig = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            CbcConfig::default()
        };
        config.check_peer_names()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CBC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            CbcConfig::default().save_to(&path)?;
        }
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    fn check_peer_names(&self) -> Result<(), ConfigError> {
        for (i, peer) in self.peers.iter().enumerate() {
            if self.peers[..i].iter().any(|p| p.name == peer.name) {
                return Err(ConfigError::DuplicatePeer(peer.name.clone()));
            }
        }
        Ok(())
    }

    /// Apply CBC_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CBC_CBC__UNKNOWN_PEERS") {
            if let Ok(policy) = v.parse() {
                self.cbc.unknown_peers = policy;
            }
        }
        if let Ok(v) = std::env::var("CBC_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Ok(v) = std::env::var("CBC_NETWORK__CBSP_PORT") {
            if let Ok(p) = v.parse() {
                self.network.cbsp_port = p;
            }
        }
        if let Ok(v) = std::env::var("CBC_BRIDGE__OP_TIMEOUT_SECS") {
            if let Ok(s) = v.parse() {
                self.bridge.op_timeout_secs = s;
            }
        }
    }
}
