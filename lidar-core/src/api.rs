//! API models for the LiDAR REST and streaming surfaces
//!
//! This module contains request and response models shared by the daemon
//! and the CLI client.

use crate::types::{DeviceState, LidarConfig, OverflowPolicy, Scan};
use serde::{Deserialize, Serialize};

/// Generic API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ApiResponse<T> {
    #[serde(rename = "success")]
    Success { data: T },
    #[serde(rename = "error")]
    Error { reason: String, error: String },
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self::Success { data }
    }

    /// Create an error response with a reason code
    pub fn error(reason: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
            error: error.into(),
        }
    }
}

/// Fault details reported while in the error state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultInfo {
    /// Reason code (e.g. "RpmStabilizationTimeout")
    pub reason: String,
    /// Human-readable description
    pub message: String,
}

/// Manager status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Lifecycle state: idle, starting, running, stopping or error
    pub state: String,
    /// Present only in the error state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultInfo>,
    /// Active hardware configuration
    pub config: LidarConfig,
    /// Number of live stream subscribers
    pub subscriber_count: usize,
    /// Samples dropped by the scan assembler since startup
    pub malformed_sample_count: u64,
    /// Completed scans published since startup
    #[serde(default)]
    pub scans_published: u64,
    /// Seconds since the manager was created
    #[serde(default)]
    pub uptime_secs: u64,
}

impl StatusResponse {
    /// Build the `state`/`fault` pair from a device state
    pub fn state_fields(state: &DeviceState) -> (String, Option<FaultInfo>) {
        let fault = state.fault().map(|reason| FaultInfo {
            reason: reason.code().to_string(),
            message: reason.to_string(),
        });
        (state.as_str().to_string(), fault)
    }
}

/// Server information response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    /// Server version
    pub version: String,
    /// "serial" or "mock"
    pub hardware_mode: String,
    /// Server uptime in seconds
    pub uptime: u64,
    /// Queue capacity given to new stream subscribers
    pub subscriber_capacity: usize,
    /// Overflow policy applied to full subscriber queues
    pub overflow_policy: OverflowPolicy,
}

/// Envelope for streamed messages
///
/// Serializes as `{"type": "lidar_scan", "data": {...}}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage<'a> {
    LidarScan(&'a Scan),
}
