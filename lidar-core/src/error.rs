//! Error types for the LiDAR service

use thiserror::Error;

/// Core error type for LiDAR operations
#[derive(Error, Debug)]
pub enum LidarError {
    /// Control operation not valid in the current device state
    #[error("Invalid transition: cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: String,
    },

    /// Start requested while the device is already starting or running
    #[error("LiDAR is already running ({0})")]
    AlreadyRunning(String),

    /// The serial session could not be opened or initialized
    #[error("Failed to open hardware: {0}")]
    HardwareOpenFailed(String),

    /// The HAL reported an I/O error or a disconnect during operation
    #[error("Hardware fault: {0}")]
    HardwareFault(String),

    /// Motor never reached the target RPM within the stabilization window
    #[error("Motor RPM did not stabilize within {timeout_ms} ms")]
    RpmStabilizationTimeout { timeout_ms: u64 },

    /// Configuration rejected before touching hardware
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reconfiguration requested while the device is in the error state
    #[error("Cannot reconfigure while in error state; stop or reset first")]
    ReconfigureWhileError,

    /// A pending start was cancelled by a concurrent stop
    #[error("Start aborted by stop request")]
    StartAborted,

    /// A single sample failed validation (counted, never escalated)
    #[error("Malformed sample: {0}")]
    MalformedSample(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Wire protocol violations (bad descriptor, checksum, sync)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Device not found during discovery
    #[error("Device not found")]
    DeviceNotFound,

    /// Device disconnected (USB unplugged, power cycle)
    #[error("Device disconnected: {0}")]
    DeviceDisconnected(String),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LidarError {
    /// Stable machine-readable reason code reported by the control surface.
    pub fn code(&self) -> &'static str {
        match self {
            LidarError::InvalidTransition { .. } => "InvalidTransition",
            LidarError::AlreadyRunning(_) => "AlreadyRunning",
            LidarError::HardwareOpenFailed(_) => "HardwareOpenFailed",
            LidarError::HardwareFault(_) => "HardwareFault",
            LidarError::RpmStabilizationTimeout { .. } => "RpmStabilizationTimeout",
            LidarError::InvalidConfig(_) => "InvalidConfig",
            LidarError::ReconfigureWhileError => "ReconfigureWhileError",
            LidarError::StartAborted => "StartAborted",
            LidarError::MalformedSample(_) => "MalformedSample",
            LidarError::Serial(_) => "Serial",
            LidarError::Protocol(_) => "Protocol",
            LidarError::Timeout(_) => "Timeout",
            LidarError::DeviceNotFound => "DeviceNotFound",
            LidarError::DeviceDisconnected(_) => "DeviceDisconnected",
            LidarError::Config(_) => "Config",
            LidarError::Io(_) => "Io",
            LidarError::Serialization(_) => "Serialization",
        }
    }
}

/// Result type alias for LiDAR operations
pub type Result<T> = std::result::Result<T, LidarError>;

impl From<serde_json::Error> for LidarError {
    fn from(err: serde_json::Error) -> Self {
        LidarError::Serialization(err.to_string())
    }
}
