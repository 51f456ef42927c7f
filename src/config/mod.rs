//! Configuration module for blockflow
//!
//! Runtime tuning knobs for the block execution engine and the application
//! orchestrator, persisted as TOML.
//!
//! # Location
//!
//! The configuration file is looked up in this order:
//! 1. The path in the `BLOCKFLOW_CONFIG` environment variable
//! 2. `blockflow.toml` in the platform config directory:
//!    - **Linux**: `~/.config/dev.blockflow.runtime/`
//!    - **macOS**: `~/Library/Application Support/dev.blockflow.runtime/`
//!    - **Windows**: `%APPDATA%\dev.blockflow.runtime\`
//!
//! A missing file means defaults.
//!
//! # Example
//!
//! ```ignore
//! use blockflow::config::RuntimeConfig;
//!
//! let mut config = RuntimeConfig::load_or_default();
//! config.terminate_on_last_block = false;
//! config.save_to("blockflow.toml")?;
//! ```

use crate::error::{BlockFlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.blockflow.runtime";

/// Config filename inside the config directory
pub const CONFIG_FILE: &str = "blockflow.toml";

/// Environment variable overriding the config path
pub const CONFIG_ENV: &str = "BLOCKFLOW_CONFIG";

/// Get the platform config directory for blockflow
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Path the configuration is loaded from
pub fn config_path() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => config_dir().map(|dir| dir.join(CONFIG_FILE)),
    }
}

/// Tuning of the execution engine and orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Request shutdown once the last running block finished
    pub terminate_on_last_block: bool,

    /// Sleep of a loop pass that did not iterate (stopped blocks), in µs
    pub idle_sleep_us: u64,

    /// Poll interval of blocking synchronous hand-offs, in ms
    pub handoff_poll_ms: u64,

    /// Poll interval of the shutdown join pass, in ms
    pub shutdown_poll_ms: u64,

    /// Give up joining a block after this long; 0 waits forever
    pub shutdown_timeout_ms: u64,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: Option<String>,

    /// Also log to this file
    pub log_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            terminate_on_last_block: true,
            idle_sleep_us: 1_000,
            handoff_poll_ms: 10,
            shutdown_poll_ms: 10,
            shutdown_timeout_ms: 0,
            log_filter: None,
            log_file: None,
        }
    }
}

impl RuntimeConfig {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = config_path().ok_or_else(|| {
            BlockFlowError::Config("Could not determine config path".to_string())
        })?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load from the default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load runtime config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BlockFlowError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            BlockFlowError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Save to the default location
    pub fn save(&self) -> Result<()> {
        let path = config_path().ok_or_else(|| {
            BlockFlowError::Config("Could not determine config path".to_string())
        })?;
        self.save_to(path)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BlockFlowError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| BlockFlowError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| BlockFlowError::Config(format!("Failed to write config: {}", e)))
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.idle_sleep_us)
    }

    /// Hand-off poll interval, never zero
    pub fn handoff_poll(&self) -> Duration {
        Duration::from_millis(self.handoff_poll_ms.max(1))
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        (self.shutdown_timeout_ms > 0).then(|| Duration::from_millis(self.shutdown_timeout_ms))
    }
}
