//! Device configuration for the outbox.
//!
//! Stored as a small JSON document. Every field is optional on disk; missing
//! values fall back to the defaults below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::SyncKind;
use crate::util::normalize_text_option;
use crate::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "cli-config.json";
const CONFIG_SCHEMA_VERSION: u32 = 1;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CradleConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    /// Local database file; the CLI picks a per-user default when unset
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Outbound spool directory used by `SpoolDelivery`
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
    /// `host:port` probed to decide whether the device is online
    #[serde(default)]
    pub probe_addr: Option<String>,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default)]
    pub storage_quota_bytes: Option<u64>,
    /// Per-kind priority overrides (lower is more urgent)
    #[serde(default)]
    pub priorities: BTreeMap<SyncKind, i32>,
}

const fn default_config_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

const fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

impl Default for CradleConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_SCHEMA_VERSION,
            db_path: None,
            spool_dir: None,
            probe_addr: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            storage_quota_bytes: None,
            priorities: BTreeMap::new(),
        }
    }
}

impl CradleConfig {
    /// Load the config at `path`, or defaults when the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            Error::Config(format!(
                "Failed to read config at {}: {error}",
                path.display()
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!(
                "Failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!(
                    "Failed to create config directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        normalized.validate()?;
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized).map_err(|error| {
            Error::Config(format!(
                "Failed to write config at {}: {error}",
                path.display()
            ))
        })
    }

    /// Priority assigned to new items of `kind`.
    pub fn priority_for(&self, kind: SyncKind) -> i32 {
        self.priorities
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_priority())
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    fn normalize(&mut self) {
        self.probe_addr = normalize_text_option(self.probe_addr.take());
        if self.sync_interval_secs == 0 {
            self.sync_interval_secs = DEFAULT_SYNC_INTERVAL_SECS;
        }
        if self.storage_quota_bytes == Some(0) {
            self.storage_quota_bytes = None;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.version != CONFIG_SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "unsupported config version {} (expected {CONFIG_SCHEMA_VERSION})",
                self.version
            )));
        }
        if let Some((kind, priority)) = self.priorities.iter().find(|(_, p)| **p < 1) {
            return Err(Error::Config(format!(
                "priority for {kind} must be at least 1, got {priority}"
            )));
        }
        Ok(())
    }
}
