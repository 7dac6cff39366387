//! CLI configuration management
//!
//! Settings are resolved through a priority chain, lowest to highest:
//! defaults, the config file (`~/.config/lidar/cli.toml`), `LIDAR_*`
//! environment variables, then command-line flags.

use anyhow::{Context, Result};
use lidar_core::default_cli_config_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the server URL
pub const ENV_SERVER: &str = "LIDAR_SERVER";
/// Environment variable naming the output format
pub const ENV_FORMAT: &str = "LIDAR_FORMAT";
/// Environment variable enabling verbose output
pub const ENV_VERBOSE: &str = "LIDAR_VERBOSE";
/// Environment variable with the request timeout in seconds
pub const ENV_TIMEOUT: &str = "LIDAR_TIMEOUT";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CliConfig {
    /// Default server URL
    pub server_url: String,

    /// Default output format
    pub output_format: String,

    /// Enable verbose logging by default
    pub verbose: bool,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            output_format: "table".to_string(),
            verbose: false,
            timeout: 10,
        }
    }
}

impl CliConfig {
    /// Load configuration from `path`, or the default location.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Option<Self>> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_cli_config_path);

        if !config_path.exists() {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read CLI config file")?;
        let config = toml::from_str(&content).context("Failed to parse CLI config file")?;
        Ok(Some(config))
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize CLI config")?;
        std::fs::write(path, content).context("Failed to write CLI config file")?;

        Ok(())
    }

    /// Default location of the CLI config file
    pub fn default_path() -> PathBuf {
        default_cli_config_path()
    }

    /// Create a new builder for constructing configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for CLI configuration with validation and priority chain support
///
/// Apply stages lowest priority first: config file, environment, flags.
/// The config file only fills unset values; the others overwrite.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    server_url: Option<String>,
    output_format: Option<String>,
    verbose: Option<bool>,
    timeout: Option<u64>,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server URL (with validation)
    pub fn with_server_url(mut self, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        Self::validate_url(&url)?;
        self.server_url = Some(url);
        Ok(self)
    }

    /// Set output format (with validation)
    pub fn with_output_format(mut self, format: impl Into<String>) -> Result<Self> {
        let format = format.into();
        Self::validate_output_format(&format)?;
        self.output_format = Some(format);
        Ok(self)
    }

    /// Set verbose flag
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Set timeout (with validation)
    pub fn with_timeout(mut self, timeout: u64) -> Result<Self> {
        Self::validate_timeout(timeout)?;
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Layer values from a config file under anything already set.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn with_config_file(self, path: Option<&Path>) -> Result<Self> {
        match CliConfig::load(path)? {
            Some(config) => Ok(self.with_file_values(config)),
            None => Ok(self),
        }
    }

    fn with_file_values(self, config: CliConfig) -> Self {
        Self {
            server_url: self.server_url.or(Some(config.server_url)),
            output_format: self.output_format.or(Some(config.output_format)),
            verbose: self.verbose.or(Some(config.verbose)),
            timeout: self.timeout.or(Some(config.timeout)),
        }
    }

    /// Apply `LIDAR_*` environment variable overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Invalid values are ignored rather than failing the whole command.
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(server_url) = lookup(ENV_SERVER) {
            if Self::validate_url(&server_url).is_ok() {
                self.server_url = Some(server_url);
            }
        }

        if let Some(format) = lookup(ENV_FORMAT) {
            if Self::validate_output_format(&format).is_ok() {
                self.output_format = Some(format);
            }
        }

        if let Some(verbose) = lookup(ENV_VERBOSE) {
            self.verbose = Some(verbose.to_lowercase() == "true" || verbose == "1");
        }

        if let Some(timeout) = lookup(ENV_TIMEOUT).and_then(|t| t.parse().ok()) {
            if Self::validate_timeout(timeout).is_ok() {
                self.timeout = Some(timeout);
            }
        }

        self
    }

    /// Build the final configuration with validation
    pub fn build(self) -> Result<CliConfig> {
        let defaults = CliConfig::default();

        let server_url = self.server_url.unwrap_or(defaults.server_url);
        let output_format = self.output_format.unwrap_or(defaults.output_format);
        let timeout = self.timeout.unwrap_or(defaults.timeout);

        Self::validate_url(&server_url)?;
        Self::validate_output_format(&output_format)?;
        Self::validate_timeout(timeout)?;

        Ok(CliConfig {
            server_url,
            output_format,
            verbose: self.verbose.unwrap_or(defaults.verbose),
            timeout,
        })
    }

    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(anyhow::anyhow!("Server URL cannot be empty"));
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "Server URL must start with http:// or https://"
            ));
        }

        Ok(())
    }

    fn validate_output_format(format: &str) -> Result<()> {
        match format {
            "table" | "json" => Ok(()),
            _ => Err(anyhow::anyhow!(
                "Invalid output format '{}'. Must be 'table' or 'json'",
                format
            )),
        }
    }

    fn validate_timeout(timeout: u64) -> Result<()> {
        if timeout == 0 {
            return Err(anyhow::anyhow!("Timeout must be greater than 0"));
        }

        if timeout > 300 {
            return Err(anyhow::anyhow!(
                "Timeout must be less than or equal to 300 seconds"
            ));
        }

        Ok(())
    }
}
