//! Configuration for bridge monitoring
//!
//! Every field has a default, so an empty TOML document (or no file at all)
//! yields a working configuration:
//!
//! ```toml
//! diagnostics = true
//! teardown_timeout_ms = 500
//!
//! [variables]
//! peer_id = "BRIDGEPEERID"
//!
//! [manager]
//! enabled = true
//! bind_address = "127.0.0.1:5038"
//!
//! [logging]
//! level = "debug"
//! json = false
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{BridgeMonError, Result};
use crate::logging::LoggingConfig;

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeMonConfig {
    pub variables: VariableNames,
    /// Write the `BRIDGEMON_*` marker variables alongside the peer id
    pub diagnostics: bool,
    /// How long `stop` waits for a concurrent host teardown to finish
    pub teardown_timeout_ms: u64,
    pub manager: ManagerConfig,
    pub logging: LogSettings,
}

/// Channel variable names written by the resolver
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariableNames {
    pub peer_id: String,
}

/// Manager (remote control) listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    pub enabled: bool,
    pub bind_address: String,
}

/// Logging settings as they appear in the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    /// Include source file and line in log lines
    pub file_info: bool,
}

impl Default for BridgeMonConfig {
    fn default() -> Self {
        Self {
            variables: VariableNames::default(),
            diagnostics: true,
            teardown_timeout_ms: 500,
            manager: ManagerConfig::default(),
            logging: LogSettings::default(),
        }
    }
}

impl Default for VariableNames {
    fn default() -> Self {
        Self {
            peer_id: "BRIDGEPEERID".to_string(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:5038".to_string(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

impl BridgeMonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BridgeMonError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be used
    pub fn validate(&self) -> Result<()> {
        if self.variables.peer_id.trim().is_empty() {
            return Err(BridgeMonError::config("variables.peer_id must not be empty"));
        }
        if self.manager.enabled {
            self.manager_addr()?;
        }
        crate::logging::parse_log_level(&self.logging.level)?;
        Ok(())
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    /// Parsed manager bind address
    pub fn manager_addr(&self) -> Result<SocketAddr> {
        self.manager.bind_address.parse().map_err(|_| {
            BridgeMonError::config(format!(
                "invalid manager.bind_address: {}",
                self.manager.bind_address
            ))
        })
    }

    /// Logging configuration derived from the `[logging]` table
    pub fn logging_config(&self) -> Result<LoggingConfig> {
        let level = crate::logging::parse_log_level(&self.logging.level)?;
        let mut config = LoggingConfig::new(level, "bridgemon");
        if self.logging.json {
            config = config.with_json();
        }
        if self.logging.file_info {
            config = config.with_file_info();
        }
        Ok(config)
    }
}
