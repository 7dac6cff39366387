//! Static configuration loaded once at startup

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LidarError, Result};
use crate::types::{LidarConfig, OverflowPolicy, DEFAULT_SUBSCRIBER_CAPACITY};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,
    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Subscriber queue settings for the streaming surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Scans buffered per subscriber before the overflow policy applies
    pub subscriber_capacity: usize,
    /// What a full queue does with an incoming scan
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            overflow_policy: OverflowPolicy::DropOldest,
        }
    }
}

/// Shutdown behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Stop the motor and close the port when the daemon exits
    pub stop_on_exit: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { stop_on_exit: true }
    }
}

/// On-disk format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from the file extension (`.yaml`/`.yml` → YAML, anything else TOML)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Static configuration for the LiDAR daemon.
///
/// Located at `~/.config/lidar/config.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticConfig {
    /// Server configuration (bind address, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Initial hardware configuration
    #[serde(default)]
    pub lidar: LidarConfig,

    /// Subscriber queue settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Shutdown behaviour
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl StaticConfig {
    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Parse StaticConfig from YAML string.
    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Parse in the given format and validate.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => Self::from_toml(content)
                .map_err(|e| LidarError::Config(format!("Invalid TOML: {}", e)))?,
            ConfigFormat::Yaml => Self::from_yaml(content)
                .map_err(|e| LidarError::Config(format!("Invalid YAML: {}", e)))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<()> {
        if self.stream.subscriber_capacity == 0 {
            return Err(LidarError::Config(
                "stream.subscriber_capacity must be greater than 0".to_string(),
            ));
        }
        self.lidar
            .validate()
            .map_err(|e| LidarError::Config(format!("[lidar] {}", e)))
    }
}
