//! LiDAR Core Library
//!
//! Shared types, models, and utilities for the LiDAR service.
//! This crate is used by the hardware driver, the daemon, and the CLI.

pub mod api;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{default_cli_config_path, default_config_path, StaticConfig};
pub use error::*;
pub use types::*;
