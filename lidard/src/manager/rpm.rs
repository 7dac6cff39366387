//! Motor speed estimation from rotation boundaries

use lidar_core::LidarConfig;
use tokio::time::Instant;
use tracing::debug;

/// Tracks rotation timing during spin-up.
///
/// Speed is derived from the interval between consecutive end-of-rotation
/// boundaries. The motor counts as stable once `stable_rotations`
/// consecutive rotations fall within tolerance of the target.
#[derive(Debug)]
pub struct RpmMonitor {
    config: LidarConfig,
    required: u32,
    consecutive: u32,
    last_boundary: Option<Instant>,
    last_rpm: Option<f64>,
}

impl RpmMonitor {
    pub fn new(config: &LidarConfig) -> Self {
        Self {
            config: config.clone(),
            required: config.stable_rotations,
            consecutive: 0,
            last_boundary: None,
            last_rpm: None,
        }
    }

    /// Record a rotation boundary observed at `now`; returns the measured RPM
    /// once two boundaries have been seen.
    pub fn on_boundary(&mut self, now: Instant) -> Option<f64> {
        let previous = self.last_boundary.replace(now)?;
        let interval = now.duration_since(previous).as_secs_f64();
        if interval <= 0.0 {
            return None;
        }

        let rpm = 60.0 / interval;
        self.last_rpm = Some(rpm);

        if self.config.rpm_within_tolerance(rpm) {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        debug!(
            "Measured {:.1} RPM (target {}, {}/{} stable)",
            rpm, self.config.motor_rpm_target, self.consecutive, self.required
        );
        Some(rpm)
    }

    /// Whether the required number of consecutive in-tolerance rotations was seen
    pub fn is_stable(&self) -> bool {
        self.consecutive >= self.required
    }

    /// Most recent measurement
    pub fn last_rpm(&self) -> Option<f64> {
        self.last_rpm
    }
}
