// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store configuration
//!
//! ```toml
//! checkpoint_interval = 1000
//! checkpoint_period = "30s"
//! sync_writes = true
//! signal_page_size = 256
//!
//! [log]
//! filter = "fxd_storage=debug"
//! file = "/var/log/fxd/store.log"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Mutations between automatic checkpoints
    pub checkpoint_interval: u64,
    /// How often the scheduler checkpoints pending work
    #[serde(with = "humantime_serde")]
    pub checkpoint_period: Duration,
    /// fsync every WAL append before returning
    pub sync_writes: bool,
    /// Signals fetched per page when replaying history
    pub signal_page_size: usize,
    pub log: LogConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 1000,
            checkpoint_period: Duration::from_secs(30),
            sync_writes: true,
            signal_page_size: 256,
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` wins when set
    pub filter: String,
    /// Write logs here instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: None,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::Invalid(
                "checkpoint_interval must be at least 1".to_string(),
            ));
        }
        if self.checkpoint_period.is_zero() {
            return Err(ConfigError::Invalid(
                "checkpoint_period must be non-zero".to_string(),
            ));
        }
        if self.signal_page_size == 0 {
            return Err(ConfigError::Invalid(
                "signal_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
