//! Scan assembly: samples in, one `Scan` per rotation out

use lidar_core::{Sample, Scan};
use lidar_hardware::HalEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// How far (in degrees) a sample may fall behind the highest angle already
/// accepted in the rotation before it counts as out of order.
pub const ANGLE_JITTER_TOLERANCE_DEG: f32 = 1.0;

/// Accumulates the in-progress rotation.
///
/// Owned by the acquisition task; there is never more than one.
pub struct ScanAssembler {
    buffer: Vec<Sample>,
    /// Highest angle accepted since the last boundary
    max_angle: Option<f32>,
    malformed: Arc<AtomicU64>,
}

impl ScanAssembler {
    /// Create an assembler that counts rejected samples into `malformed`
    pub fn new(malformed: Arc<AtomicU64>) -> Self {
        Self {
            buffer: Vec::with_capacity(512),
            max_angle: None,
            malformed,
        }
    }

    /// Feed one HAL event; returns the finished scan on a rotation boundary.
    ///
    /// Malformed and out-of-order samples are counted and skipped without
    /// aborting the rotation. A sample is out of order when its angle is more
    /// than [`ANGLE_JITTER_TOLERANCE_DEG`] below the highest angle accepted
    /// in the current rotation. A boundary with no buffered samples yields an
    /// empty scan.
    pub fn feed(&mut self, event: HalEvent) -> Option<Scan> {
        match event {
            HalEvent::Sample(sample) => {
                if let Err(e) = sample.validate() {
                    self.malformed.fetch_add(1, Ordering::Relaxed);
                    trace!("Dropping sample: {}", e);
                    return None;
                }

                match self.max_angle {
                    Some(max) if sample.angle + ANGLE_JITTER_TOLERANCE_DEG < max => {
                        self.malformed.fetch_add(1, Ordering::Relaxed);
                        trace!(
                            "Dropping out-of-order sample at {} (rotation reached {})",
                            sample.angle,
                            max
                        );
                    }
                    _ => {
                        let max = self.max_angle.map_or(sample.angle, |m| m.max(sample.angle));
                        self.max_angle = Some(max);
                        self.buffer.push(sample);
                    }
                }
                None
            }
            HalEvent::EndOfRotation => {
                self.max_angle = None;
                let points = std::mem::replace(&mut self.buffer, Vec::with_capacity(512));
                if points.is_empty() {
                    debug!("Rotation completed with no valid samples");
                }
                Some(Scan::new(points))
            }
        }
    }

}
