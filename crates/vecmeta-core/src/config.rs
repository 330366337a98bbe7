//! Engine configuration.
//!
//! A plain serde struct tree, loadable from TOML. Every section defaults so
//! a partial (or absent) config file yields a working single-node setup with
//! an in-memory meta store.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub general: GeneralConfig,
    pub cluster: ClusterConfig,
    pub snapshot: SnapshotConfig,
    pub log: LogConfig,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root path under which the meta directory is created.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: "./vecmeta_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Meta store URI: `mem://` or `file://`.
    pub meta_uri: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            meta_uri: "mem://".to_string(),
        }
    }
}

/// Role of this node when `cluster.enable` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterRole {
    /// Read-write node: runs the writer timer.
    #[default]
    Rw,
    /// Read-only replica: runs the reader timer.
    Ro,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub enable: bool,
    pub role: ClusterRole,
}

/// Which superseded snapshots a holder retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Keep the `keep_num` most recent snapshots.
    #[default]
    Num,
    /// Keep superseded snapshots younger than `duration_secs`.
    Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub policy: PolicyKind,
    pub keep_num: usize,
    pub duration_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            policy: PolicyKind::Num,
            keep_num: 1,
            duration_secs: 300,
        }
    }
}

/// How log records are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Full,
    /// Newline-delimited JSON for log pipelines.
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directives when `RUST_LOG` is unset, e.g. `"info"` or
    /// `"vecmeta_core=debug,info"`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            format: LogFormat::Full,
        }
    }
}
