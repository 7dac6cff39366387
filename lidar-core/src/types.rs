//! Core types and data structures for the LiDAR service

use crate::error::{LidarError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Maximum motor PWM duty accepted by RPLIDAR motor controllers
pub const MAX_PWM_DUTY: u16 = 1023;

/// Default motor PWM duty
pub const DEFAULT_PWM_DUTY: u16 = 600;

/// Default subscriber queue capacity
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 10;

/// A single range measurement.
///
/// `distance == 0.0` means the beam produced no return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Bearing in degrees, `[0, 360)`
    pub angle: f32,
    /// Range in millimeters
    pub distance: f32,
    /// Return strength / quality
    pub intensity: u8,
}

impl Sample {
    /// Create a new sample
    pub fn new(angle: f32, distance: f32, intensity: u8) -> Self {
        Self {
            angle,
            distance,
            intensity,
        }
    }

    /// Check the sample against the physical domain of the sensor
    pub fn validate(&self) -> Result<()> {
        if !self.angle.is_finite() || !(0.0..360.0).contains(&self.angle) {
            return Err(LidarError::MalformedSample(format!(
                "angle {} outside [0, 360)",
                self.angle
            )));
        }
        if !self.distance.is_finite() || self.distance < 0.0 {
            return Err(LidarError::MalformedSample(format!(
                "distance {} is not a non-negative number",
                self.distance
            )));
        }
        Ok(())
    }

    /// Whether the beam produced a return
    pub fn has_return(&self) -> bool {
        self.distance > 0.0
    }
}

/// One complete 360° rotation.
///
/// Immutable once constructed; shared between the latest-scan cache and
/// every subscriber behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    timestamp: f64,
    #[serde(skip)]
    captured_at: Option<Instant>,
    points: Vec<Sample>,
}

impl Scan {
    /// Finalize a rotation, stamping it with the current wall and monotonic time
    pub fn new(points: Vec<Sample>) -> Self {
        Self {
            timestamp: wall_clock_secs(),
            captured_at: Some(Instant::now()),
            points,
        }
    }

    /// Build a scan with an explicit wall-clock timestamp
    pub fn with_timestamp(timestamp: f64, points: Vec<Sample>) -> Self {
        Self {
            timestamp,
            captured_at: Some(Instant::now()),
            points,
        }
    }

    /// Wall-clock time of finalization, seconds since the Unix epoch
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Monotonic instant of finalization (absent on deserialized scans)
    pub fn captured_at(&self) -> Option<Instant> {
        self.captured_at
    }

    /// Samples in arrival order
    pub fn points(&self) -> &[Sample] {
        &self.points
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the rotation carried no samples (e.g. a stall)
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Why the device entered the error state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultReason {
    /// Starting never reached the target RPM
    RpmStabilizationTimeout,
    /// The serial session could not be opened
    HardwareOpenFailed(String),
    /// The HAL reported an I/O error or disconnect
    HardwareFault(String),
}

impl FaultReason {
    /// Reason code, matching [`LidarError::code`]
    pub fn code(&self) -> &'static str {
        match self {
            FaultReason::RpmStabilizationTimeout => "RpmStabilizationTimeout",
            FaultReason::HardwareOpenFailed(_) => "HardwareOpenFailed",
            FaultReason::HardwareFault(_) => "HardwareFault",
        }
    }
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReason::RpmStabilizationTimeout => write!(f, "motor RPM did not stabilize"),
            FaultReason::HardwareOpenFailed(msg) => write!(f, "hardware open failed: {}", msg),
            FaultReason::HardwareFault(msg) => write!(f, "hardware fault: {}", msg),
        }
    }
}

/// Device lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Error(FaultReason),
}

impl DeviceState {
    /// Get a string representation for API responses
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Idle => "idle",
            DeviceState::Starting => "starting",
            DeviceState::Running => "running",
            DeviceState::Stopping => "stopping",
            DeviceState::Error(_) => "error",
        }
    }

    /// The fault, if in the error state
    pub fn fault(&self) -> Option<&FaultReason> {
        match self {
            DeviceState::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Error(reason) => write!(f, "error ({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// What a full subscriber queue does with an incoming scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued scan to admit the new one
    #[default]
    DropOldest,
    /// Keep the queue as is and discard the incoming scan
    DropNewest,
}

/// Hardware configuration for a single LiDAR unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarConfig {
    /// Serial device path (e.g. "/dev/ttyUSB0")
    pub serial_port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Motor PWM duty (0-1023)
    pub pwm_duty: u16,
    /// Expected motor speed once spun up
    pub motor_rpm_target: u32,
    /// Accepted relative deviation from the target RPM
    #[serde(default = "default_rpm_tolerance")]
    pub rpm_tolerance: f64,
    /// Upper bound on the Starting phase, in milliseconds
    #[serde(default = "default_stabilization_timeout_ms")]
    pub stabilization_timeout_ms: u64,
    /// Consecutive in-tolerance rotations required before Running
    #[serde(default = "default_stable_rotations")]
    pub stable_rotations: u32,
    /// Serial read/write timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_rpm_tolerance() -> f64 {
    0.1
}

fn default_stabilization_timeout_ms() -> u64 {
    5000
}

fn default_stable_rotations() -> u32 {
    2
}

fn default_read_timeout_ms() -> u64 {
    3000
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 460_800,
            pwm_duty: DEFAULT_PWM_DUTY,
            motor_rpm_target: 600,
            rpm_tolerance: default_rpm_tolerance(),
            stabilization_timeout_ms: default_stabilization_timeout_ms(),
            stable_rotations: default_stable_rotations(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl LidarConfig {
    /// Structural validation; never touches hardware
    pub fn validate(&self) -> Result<()> {
        if self.serial_port.trim().is_empty() {
            return Err(LidarError::InvalidConfig(
                "serial_port must not be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(LidarError::InvalidConfig(
                "baud_rate must be greater than 0".to_string(),
            ));
        }
        if self.pwm_duty > MAX_PWM_DUTY {
            return Err(LidarError::InvalidConfig(format!(
                "pwm_duty must be 0-{}, got {}",
                MAX_PWM_DUTY, self.pwm_duty
            )));
        }
        if self.motor_rpm_target == 0 {
            return Err(LidarError::InvalidConfig(
                "motor_rpm_target must be greater than 0".to_string(),
            ));
        }
        if !(self.rpm_tolerance > 0.0 && self.rpm_tolerance < 1.0) {
            return Err(LidarError::InvalidConfig(format!(
                "rpm_tolerance must be in (0, 1), got {}",
                self.rpm_tolerance
            )));
        }
        if self.stabilization_timeout_ms == 0 {
            return Err(LidarError::InvalidConfig(
                "stabilization_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.stable_rotations == 0 {
            return Err(LidarError::InvalidConfig(
                "stable_rotations must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `rpm` is within tolerance of the target
    pub fn rpm_within_tolerance(&self, rpm: f64) -> bool {
        let target = self.motor_rpm_target as f64;
        (rpm - target).abs() <= target * self.rpm_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_validation() {
        assert!(Sample::new(0.0, 1200.5, 47).validate().is_ok());
        assert!(Sample::new(359.9, 0.0, 0).validate().is_ok());

        assert!(Sample::new(360.0, 100.0, 10).validate().is_err());
        assert!(Sample::new(-0.5, 100.0, 10).validate().is_err());
        assert!(Sample::new(f32::NAN, 100.0, 10).validate().is_err());
        assert!(Sample::new(10.0, -1.0, 10).validate().is_err());
        assert!(Sample::new(10.0, f32::INFINITY, 10).validate().is_err());
    }

    #[test]
    fn test_scan_serialization_shape() {
        let scan = Scan::with_timestamp(1.0, vec![Sample::new(0.0, 1200.5, 47)]);
        let json = serde_json::to_value(&scan).unwrap();

        assert_eq!(json["timestamp"], 1.0);
        assert_eq!(json["points"][0]["angle"], 0.0);
        assert_eq!(json["points"][0]["distance"], 1200.5);
        assert_eq!(json["points"][0]["intensity"], 47);
        assert!(json.get("captured_at").is_none());
    }

    #[test]
    fn test_scan_deserialization_has_no_instant() {
        let scan: Scan =
            serde_json::from_str(r#"{"timestamp": 2.5, "points": []}"#).unwrap();
        assert_eq!(scan.timestamp(), 2.5);
        assert!(scan.is_empty());
        assert!(scan.captured_at().is_none());
    }

    #[test]
    fn test_device_state_strings() {
        assert_eq!(DeviceState::Idle.as_str(), "idle");
        assert_eq!(DeviceState::Running.as_str(), "running");
        let err = DeviceState::Error(FaultReason::RpmStabilizationTimeout);
        assert_eq!(err.as_str(), "error");
        assert_eq!(err.fault().unwrap().code(), "RpmStabilizationTimeout");
        assert_eq!(err.to_string(), "error (motor RPM did not stabilize)");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(LidarConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_structural_errors() {
        let zero_rpm = LidarConfig {
            motor_rpm_target: 0,
            ..LidarConfig::default()
        };
        assert!(matches!(
            zero_rpm.validate(),
            Err(LidarError::InvalidConfig(_))
        ));

        let empty_port = LidarConfig {
            serial_port: "  ".to_string(),
            ..LidarConfig::default()
        };
        assert!(empty_port.validate().is_err());

        let pwm = LidarConfig {
            pwm_duty: 1024,
            ..LidarConfig::default()
        };
        assert!(pwm.validate().is_err());

        let tolerance = LidarConfig {
            rpm_tolerance: 1.5,
            ..LidarConfig::default()
        };
        assert!(tolerance.validate().is_err());
    }

    #[test]
    fn test_rpm_tolerance() {
        let config = LidarConfig {
            motor_rpm_target: 600,
            rpm_tolerance: 0.1,
            ..LidarConfig::default()
        };
        assert!(config.rpm_within_tolerance(600.0));
        assert!(config.rpm_within_tolerance(545.0));
        assert!(config.rpm_within_tolerance(660.0));
        assert!(!config.rpm_within_tolerance(500.0));
        assert!(!config.rpm_within_tolerance(700.0));
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: LidarConfig = serde_json::from_str(
            r#"{"serial_port": "/dev/ttyUSB1", "baud_rate": 115200, "pwm_duty": 660, "motor_rpm_target": 480}"#,
        )
        .unwrap();
        assert_eq!(config.rpm_tolerance, 0.1);
        assert_eq!(config.stabilization_timeout_ms, 5000);
        assert_eq!(config.stable_rotations, 2);
    }

    #[test]
    fn test_overflow_policy_serialization() {
        let json = serde_json::to_string(&OverflowPolicy::DropOldest).unwrap();
        assert_eq!(json, r#""drop_oldest""#);
        let policy: OverflowPolicy = serde_json::from_str(r#""drop_newest""#).unwrap();
        assert_eq!(policy, OverflowPolicy::DropNewest);
    }
}
