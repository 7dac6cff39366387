//! lidar-hardware
//!
//! Hardware abstraction crate for the LiDAR service. It defines the driver
//! traits the management layer programs against, the RPLIDAR wire protocol,
//! a tokio-serial driver, and a simulated sensor for running without hardware.
//!
//! Public API:
//! - `driver::{LidarDriver, DriverFactory}` - the HAL boundary
//! - `serial_driver::SerialDriverFactory` - opens real devices
//! - `serial_driver::find_lidar` - helper to locate the device by VID/PID
//! - `simulated::SimulatedFactory` - opens simulated devices

pub mod driver;
pub mod protocol;
pub mod serial_driver;
pub mod simulated;

pub use driver::{DriverFactory, HalEvent, LidarCommand, LidarDriver};
pub use serial_driver::{find_lidar, is_disconnect_error, SerialDriver, SerialDriverFactory};
pub use simulated::{SimulatedFactory, SimulatedLidar};
