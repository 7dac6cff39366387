//! HAL driver interface
//!
//! The management layer only ever talks to hardware through these traits,
//! which lets it run against the serial driver, the simulator, or scripted
//! mocks in tests.

use async_trait::async_trait;
use lidar_core::{LidarConfig, Result, Sample};

/// Commands the management layer can issue to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidarCommand {
    /// Drive the motor at the given PWM duty (0-1023)
    SetMotorPwm(u16),
    /// Begin streaming measurements
    StartScan,
    /// Stop streaming measurements
    StopScan,
    /// Halt the motor
    StopMotor,
}

/// One item read from the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HalEvent {
    /// A measurement belonging to the current rotation
    Sample(Sample),
    /// The current rotation is complete; the next sample starts a new one
    EndOfRotation,
}

/// An open hardware session.
///
/// Exactly one handle exists per physical device; it is owned by the
/// acquisition loop and never shared.
#[async_trait]
pub trait LidarDriver: Send {
    /// Issue a command and wait until the device has accepted it
    async fn send_command(&mut self, command: LidarCommand) -> Result<()>;

    /// Read the next sample or rotation boundary.
    ///
    /// Must be cancellation safe: dropping the future between polls loses no
    /// already-decoded data.
    async fn read_sample(&mut self) -> Result<HalEvent>;

    /// Release the session
    async fn close(&mut self) -> Result<()>;

    /// Device path, when backed by a real port
    fn port_path(&self) -> Option<&str> {
        None
    }
}

/// Opens hardware sessions from a configuration
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Open and initialize a session for `config`
    async fn open(&self, config: &LidarConfig) -> Result<Box<dyn LidarDriver>>;

    /// Short description of the backend ("serial", "mock")
    fn mode(&self) -> &'static str;
}
