//! Shutdown handling for graceful daemon termination
//!
//! Stops the motor and releases the serial port before the process exits,
//! so the sensor does not keep spinning after the daemon is gone.

use crate::manager::LidarManager;
use lidar_core::config::ShutdownConfig;
use std::sync::Arc;
use tracing::info;

/// Release the device before exit.
///
/// With `stop_on_exit` disabled the acquisition task is abandoned and the
/// hardware is left as it is.
pub async fn release_lidar(manager: &Arc<LidarManager>, shutdown_config: &ShutdownConfig) {
    if !shutdown_config.stop_on_exit {
        info!("Stop on exit disabled in config");
    }
    manager.shutdown(shutdown_config.stop_on_exit).await;
    info!("LiDAR released (state: {})", manager.state());
}
