//! Configuration loading for the daemon
//!
//! The static configuration is read once at startup. A missing TOML file is
//! created with defaults so a first run leaves an editable file behind.

use lidar_core::config::{ConfigFormat, StaticConfig};
use lidar_core::{LidarError, Result};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Load the static config, creating a default TOML file when absent.
pub(crate) async fn load_static_config(path: &Path) -> Result<StaticConfig> {
    let format = ConfigFormat::from_path(path);

    if !path.exists() {
        if format == ConfigFormat::Yaml {
            return Err(LidarError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        info!(
            "Static config not found at {}. Creating with defaults.",
            path.display()
        );
        let config = StaticConfig::default();
        write_default(path, &config).await?;
        return Ok(config);
    }

    let content = fs::read_to_string(path).await.map_err(|e| {
        LidarError::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config = StaticConfig::parse(&content, format)?;
    debug!("--- Static Config ---");
    debug!("  Bind: {}:{}", config.server.bind, config.server.port);
    debug!(
        "  LiDAR: {} @ {} baud, pwm {}, target {} RPM",
        config.lidar.serial_port,
        config.lidar.baud_rate,
        config.lidar.pwm_duty,
        config.lidar.motor_rpm_target
    );
    debug!(
        "  Stream: capacity {}, {:?}",
        config.stream.subscriber_capacity, config.stream.overflow_policy
    );
    Ok(config)
}

async fn write_default(path: &Path, config: &StaticConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            LidarError::Config(format!(
                "Failed to create config directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let toml_str = config
        .to_toml()
        .map_err(|e| LidarError::Config(format!("Failed to serialize config: {}", e)))?;
    fs::write(path, toml_str).await.map_err(|e| {
        LidarError::Config(format!(
            "Failed to write config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(())
}
