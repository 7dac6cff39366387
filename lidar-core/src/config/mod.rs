//! Configuration types for the LiDAR service
//!
//! [`StaticConfig`] holds server, hardware and streaming settings. It is
//! loaded once at startup; the hardware section can later be replaced at
//! runtime through the control API, which never writes it back to disk.

mod paths;
mod static_config;

pub use paths::{default_cli_config_path, default_config_path};
pub use static_config::{
    ConfigFormat, ServerConfig, ShutdownConfig, StaticConfig, StreamConfig,
};
