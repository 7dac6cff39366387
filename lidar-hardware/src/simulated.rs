//! Simulated LiDAR for running without hardware (`--mock`)
//!
//! Models a sensor in a rectangular room. Motor speed follows the PWM duty
//! and ramps up over a few rotations, so the stabilization logic sees the
//! same shape of data it would from a real unit.

use async_trait::async_trait;
use lidar_core::{LidarConfig, LidarError, Result, Sample};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::driver::{DriverFactory, HalEvent, LidarCommand, LidarDriver};

/// Motor speed produced per unit of PWM duty
pub const RPM_PER_DUTY: f64 = 1.0;

/// Samples emitted per rotation
pub const SAMPLES_PER_ROTATION: usize = 360;

/// Half extents of the simulated room, in millimeters
const ROOM_HALF_WIDTH: f32 = 2000.0;
const ROOM_HALF_DEPTH: f32 = 1500.0;

/// Fraction of the remaining speed gap closed per rotation while spinning up
const RAMP_FACTOR: f64 = 0.5;

/// Motor speed the simulated motor starts from when first driven
const SPIN_UP_RPM: f64 = 120.0;

pub struct SimulatedLidar {
    duty: u16,
    rpm: f64,
    scanning: bool,
    rotation: u64,
    read_timeout: Duration,
    pending: VecDeque<HalEvent>,
}

impl SimulatedLidar {
    pub fn new(config: &LidarConfig) -> Self {
        Self {
            duty: 0,
            rpm: 0.0,
            scanning: false,
            rotation: 0,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            pending: VecDeque::new(),
        }
    }

    /// Current simulated motor speed
    pub fn rpm(&self) -> f64 {
        self.rpm
    }

    fn target_rpm(&self) -> f64 {
        self.duty as f64 * RPM_PER_DUTY
    }

    /// Speed the motor will have reached by the end of the next rotation
    fn next_rpm(&self) -> f64 {
        let target = self.target_rpm();
        if self.rpm <= 0.0 {
            SPIN_UP_RPM.min(target)
        } else {
            self.rpm + (target - self.rpm) * RAMP_FACTOR
        }
    }

    fn fill_rotation(&mut self) {
        // Rotate the starting bearing a little each turn, like a real sensor
        let offset = (self.rotation % 8) as f32 * 0.125;
        for i in 0..SAMPLES_PER_ROTATION {
            let angle = (i as f32 + offset) % 360.0;
            let distance = room_distance(angle);
            let intensity = if distance > 0.0 { 47 } else { 0 };
            self.pending
                .push_back(HalEvent::Sample(Sample::new(angle, distance, intensity)));
        }
        self.pending.push_back(HalEvent::EndOfRotation);
        self.rotation += 1;
    }
}

/// Distance from the center of the room to its wall along `angle`
fn room_distance(angle: f32) -> f32 {
    let rad = angle.to_radians();
    let (sin, cos) = (rad.sin().abs(), rad.cos().abs());
    let to_x = if cos > f32::EPSILON {
        ROOM_HALF_WIDTH / cos
    } else {
        f32::INFINITY
    };
    let to_y = if sin > f32::EPSILON {
        ROOM_HALF_DEPTH / sin
    } else {
        f32::INFINITY
    };
    to_x.min(to_y)
}

#[async_trait]
impl LidarDriver for SimulatedLidar {
    async fn send_command(&mut self, command: LidarCommand) -> Result<()> {
        debug!("Simulated LiDAR: {:?}", command);
        match command {
            LidarCommand::SetMotorPwm(duty) => {
                self.duty = duty;
                if duty == 0 {
                    self.rpm = 0.0;
                }
            }
            LidarCommand::StartScan => {
                self.pending.clear();
                self.scanning = true;
            }
            LidarCommand::StopScan => {
                self.pending.clear();
                self.scanning = false;
            }
            LidarCommand::StopMotor => {
                self.duty = 0;
                self.rpm = 0.0;
            }
        }
        Ok(())
    }

    async fn read_sample(&mut self) -> Result<HalEvent> {
        if !self.scanning {
            return Err(LidarError::Protocol("scan not started".to_string()));
        }

        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        if self.duty == 0 {
            tokio::time::sleep(self.read_timeout).await;
            return Err(LidarError::Timeout(format!(
                "no scan data for {} ms",
                self.read_timeout.as_millis()
            )));
        }

        // One sleep per rotation, then the whole rotation is served from the
        // queue. State only changes after the sleep completes.
        let rpm = self.next_rpm();
        tokio::time::sleep(Duration::from_secs_f64(60.0 / rpm)).await;
        self.rpm = rpm;
        self.fill_rotation();

        self.pending
            .pop_front()
            .ok_or_else(|| LidarError::Protocol("empty simulated rotation".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.scanning = false;
        self.duty = 0;
        self.rpm = 0.0;
        self.pending.clear();
        Ok(())
    }
}

/// Opens [`SimulatedLidar`] sessions
#[derive(Debug, Clone, Default)]
pub struct SimulatedFactory;

#[async_trait]
impl DriverFactory for SimulatedFactory {
    async fn open(&self, config: &LidarConfig) -> Result<Box<dyn LidarDriver>> {
        debug!("Opening simulated LiDAR for {}", config.serial_port);
        Ok(Box::new(SimulatedLidar::new(config)))
    }

    fn mode(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_rotation(lidar: &mut SimulatedLidar) -> Vec<Sample> {
        let mut samples = Vec::new();
        loop {
            match lidar.read_sample().await.unwrap() {
                HalEvent::Sample(sample) => samples.push(sample),
                HalEvent::EndOfRotation => return samples,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_full_valid_rotations() {
        let mut lidar = SimulatedLidar::new(&LidarConfig::default());
        lidar.send_command(LidarCommand::SetMotorPwm(600)).await.unwrap();
        lidar.send_command(LidarCommand::StartScan).await.unwrap();

        let samples = read_rotation(&mut lidar).await;
        assert_eq!(samples.len(), SAMPLES_PER_ROTATION);
        assert!(samples.iter().all(|s| s.validate().is_ok()));
        assert!(samples.iter().all(|s| s.has_return()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rpm_converges_to_duty() {
        let mut lidar = SimulatedLidar::new(&LidarConfig::default());
        lidar.send_command(LidarCommand::SetMotorPwm(600)).await.unwrap();
        lidar.send_command(LidarCommand::StartScan).await.unwrap();

        read_rotation(&mut lidar).await;
        assert!(lidar.rpm() < 600.0);

        for _ in 0..10 {
            read_rotation(&mut lidar).await;
        }
        assert!((lidar.rpm() - 600.0).abs() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_read_leaves_motor_unchanged() {
        let mut lidar = SimulatedLidar::new(&LidarConfig::default());
        lidar.send_command(LidarCommand::SetMotorPwm(600)).await.unwrap();
        lidar.send_command(LidarCommand::StartScan).await.unwrap();

        // A rotation at spin-up speed takes 500 ms
        for _ in 0..3 {
            let read = tokio::time::timeout(Duration::from_millis(100), lidar.read_sample()).await;
            assert!(read.is_err());
            assert_eq!(lidar.rpm(), 0.0);
        }

        let samples = read_rotation(&mut lidar).await;
        assert_eq!(samples.len(), SAMPLES_PER_ROTATION);
        assert_eq!(lidar.rpm(), SPIN_UP_RPM);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_motor_times_out() {
        let mut lidar = SimulatedLidar::new(&LidarConfig::default());
        lidar.send_command(LidarCommand::StartScan).await.unwrap();

        let err = lidar.read_sample().await.unwrap_err();
        assert!(matches!(err, LidarError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_read_before_scan_fails() {
        let mut lidar = SimulatedLidar::new(&LidarConfig::default());
        assert!(lidar.read_sample().await.is_err());
    }

    #[test]
    fn test_room_distance() {
        assert!((room_distance(0.0) - ROOM_HALF_WIDTH).abs() < 0.01);
        assert!((room_distance(90.0) - ROOM_HALF_DEPTH).abs() < 0.01);
        assert!((room_distance(180.0) - ROOM_HALF_WIDTH).abs() < 0.01);
    }
}
