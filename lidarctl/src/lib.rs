//! LiDAR CLI Library
//!
//! This library provides the core functionality for the `lidarctl` tool.
//!
//! # Public API
//!
//! The primary public API is the [`client::LidarClient`] which provides
//! programmatic access to the LiDAR daemon. Configuration types are also
//! available via [`config::CliConfig`] and [`config::ConfigBuilder`].
//!
//! ```no_run
//! use lidarctl::client::LidarClient;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = LidarClient::with_config(
//!     "http://localhost:8000".to_string(),
//!     10,  // timeout in seconds
//!     3,   // max retries
//!     Duration::from_millis(500),  // initial retry delay
//! ).await?;
//!
//! client.start().await?;
//! let scan = client.latest_scan().await?;
//! println!("{} points", scan.len());
//! # Ok(())
//! # }
//! ```

// Internal CLI implementation - not part of public API
#[doc(hidden)]
pub mod cli;

/// HTTP client for communicating with the LiDAR daemon.
pub mod client;

/// Configuration types for the CLI tool.
pub mod config;

// Internal formatting functions - not part of public API
#[doc(hidden)]
pub mod format;

#[cfg(test)]
pub mod test_utils;
