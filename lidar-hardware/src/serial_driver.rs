//! Serial driver for RPLIDAR-class devices
//!
//! Provides async serial I/O with the sensor over a USB-UART bridge.

use async_trait::async_trait;
use lidar_core::{LidarConfig, LidarError, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};

use crate::driver::{DriverFactory, HalEvent, LidarCommand, LidarDriver};
use crate::protocol::{
    encode_motor_pwm, encode_request, Command, Descriptor, DeviceHealth, DeviceInfo,
    HealthStatus, NodeDecoder, SendMode, DESCRIPTOR_LEN, RESPONSE_TYPE_HEALTH,
    RESPONSE_TYPE_INFO, RESPONSE_TYPE_SCAN, SCAN_NODE_LEN,
};

/// Silicon Labs CP2102 bridge fitted to RPLIDAR A-series adapters
pub const USB_VID: u16 = 0x10C4;
pub const USB_PID: u16 = 0xEA60;

/// Value of `serial_port` that triggers VID/PID discovery
pub const AUTO_PORT: &str = "auto";

/// Serial driver for hardware communication
pub struct SerialDriver {
    port: SerialStream,
    port_path: String,
    timeout_duration: Duration,
    debug_uart: bool,
    decoder: NodeDecoder,
    pending: VecDeque<HalEvent>,
    scanning: bool,
    seen_rotation_start: bool,
}

impl SerialDriver {
    /// Open the serial port
    ///
    /// # Arguments
    /// * `port_path` - Path to the serial device (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Line speed (460800 for A2/A3, 115200 for A1)
    /// * `timeout_ms` - Timeout in milliseconds for read/write operations
    /// * `debug_uart` - Enable UART debug logging
    pub fn new(port_path: &str, baud_rate: u32, timeout_ms: u64, debug_uart: bool) -> Result<Self> {
        debug!("Opening serial port: {} @ {} baud", port_path, baud_rate);

        let mut port = tokio_serial::new(port_path, baud_rate)
            .timeout(Duration::from_millis(timeout_ms))
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", port_path, e);
                LidarError::Serial(format!("Failed to open serial port: {}", e))
            })?;

        // A1 adapters gate the motor on DTR; keep it deasserted so PWM is in control
        if let Err(e) = port.write_data_terminal_ready(false) {
            warn!("Failed to clear DTR on {}: {}", port_path, e);
        }

        Ok(Self {
            port,
            port_path: port_path.to_string(),
            timeout_duration: Duration::from_millis(timeout_ms),
            debug_uart,
            decoder: NodeDecoder::new(),
            pending: VecDeque::new(),
            scanning: false,
            seen_rotation_start: false,
        })
    }

    /// Bring the device into a known state and log its identity.
    ///
    /// Fails if the device does not answer or reports a health error.
    pub async fn initialize(&mut self) -> Result<DeviceInfo> {
        // A previous session may have left the device streaming
        self.stop_scan().await?;

        let info = self.get_info().await?;
        info!(
            "RPLIDAR model 0x{:02X} firmware {}.{:02} hardware {} serial {}",
            info.model, info.firmware_major, info.firmware_minor, info.hardware, info.serial_number
        );

        let health = self.get_health().await?;
        match health.status {
            HealthStatus::Good => debug!("Device health: good"),
            HealthStatus::Warning => warn!("Device health warning (code {})", health.error_code),
            HealthStatus::Error => {
                error!("Device health error (code {})", health.error_code);
                return Err(LidarError::Protocol(format!(
                    "device reports health error code {}",
                    health.error_code
                )));
            }
        }

        Ok(info)
    }

    /// Query device identification
    pub async fn get_info(&mut self) -> Result<DeviceInfo> {
        self.send(&encode_request(Command::GetInfo, &[])).await?;
        let descriptor = self.read_descriptor().await?;
        descriptor.expect(RESPONSE_TYPE_INFO, DeviceInfo::LEN as u32, SendMode::Single)?;
        let payload = self.read_exact_timed(DeviceInfo::LEN).await?;
        DeviceInfo::parse(&payload)
    }

    /// Query the self-test result
    pub async fn get_health(&mut self) -> Result<DeviceHealth> {
        self.send(&encode_request(Command::GetHealth, &[])).await?;
        let descriptor = self.read_descriptor().await?;
        descriptor.expect(RESPONSE_TYPE_HEALTH, DeviceHealth::LEN as u32, SendMode::Single)?;
        let payload = self.read_exact_timed(DeviceHealth::LEN).await?;
        DeviceHealth::parse(&payload)
    }

    /// Send a raw packet and flush it to the wire
    async fn send(&mut self, packet: &[u8]) -> Result<()> {
        if self.debug_uart {
            debug!("TX: {:02X?}", packet);
        }

        timeout(self.timeout_duration, self.port.write_all(packet))
            .await
            .map_err(|_| {
                error!("Write timeout");
                LidarError::Timeout("Write operation timed out".to_string())
            })?
            .map_err(|e| {
                error!("Write failed: {}", e);
                LidarError::Serial(format!("Write failed: {}", e))
            })?;

        timeout(self.timeout_duration, self.port.flush())
            .await
            .map_err(|_| LidarError::Timeout("Flush operation timed out".to_string()))?
            .map_err(|e| LidarError::Serial(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    /// Read exactly `len` bytes within the configured timeout
    async fn read_exact_timed(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        match timeout(self.timeout_duration, self.port.read_exact(&mut buf)).await {
            Ok(Ok(_)) => {
                if self.debug_uart {
                    debug!("RX: {:02X?}", buf);
                }
                Ok(buf)
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!("Serial port returned EOF - device may have been disconnected");
                Err(LidarError::DeviceDisconnected(
                    "Serial port returned EOF - device may have been unplugged".to_string(),
                ))
            }
            Ok(Err(e)) => {
                error!("Read error: {}", e);
                Err(LidarError::Serial(format!("Read error: {}", e)))
            }
            Err(_) => {
                error!("Read timeout");
                Err(LidarError::Timeout("Read operation timed out".to_string()))
            }
        }
    }

    async fn read_descriptor(&mut self) -> Result<Descriptor> {
        let bytes = self.read_exact_timed(DESCRIPTOR_LEN).await?;
        Descriptor::parse(&bytes)
    }

    async fn start_scan(&mut self) -> Result<()> {
        self.clear_input_buffer()?;
        self.decoder.clear();
        self.pending.clear();
        self.seen_rotation_start = false;

        self.send(&encode_request(Command::Scan, &[])).await?;
        let descriptor = self.read_descriptor().await?;
        descriptor.expect(RESPONSE_TYPE_SCAN, SCAN_NODE_LEN as u32, SendMode::Multiple)?;

        self.scanning = true;
        debug!("Scan started on {}", self.port_path);
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<()> {
        self.send(&encode_request(Command::Stop, &[])).await?;
        // The device needs at least 1 ms before it accepts the next request
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.clear_input_buffer()?;
        self.decoder.clear();
        self.pending.clear();
        self.scanning = false;
        Ok(())
    }

    /// Clear the input buffer
    fn clear_input_buffer(&mut self) -> Result<()> {
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| {
                warn!("Failed to clear input buffer: {}", e);
                LidarError::Serial(format!("Failed to clear buffer: {}", e))
            })
    }

    /// Turn decoded nodes into HAL events.
    ///
    /// Nodes before the first start flag belong to a partial rotation and are
    /// discarded. Every later start flag closes the previous rotation.
    fn drain_nodes(&mut self) {
        while let Some(node) = self.decoder.next_node() {
            if node.start {
                if self.seen_rotation_start {
                    self.pending.push_back(HalEvent::EndOfRotation);
                }
                self.seen_rotation_start = true;
            }
            if self.seen_rotation_start {
                self.pending.push_back(HalEvent::Sample(node.sample));
            }
        }
    }
}

#[async_trait]
impl LidarDriver for SerialDriver {
    async fn send_command(&mut self, command: LidarCommand) -> Result<()> {
        debug!("{}: {:?}", self.port_path, command);
        match command {
            LidarCommand::SetMotorPwm(duty) => self.send(&encode_motor_pwm(duty)).await,
            LidarCommand::StartScan => self.start_scan().await,
            LidarCommand::StopScan => self.stop_scan().await,
            LidarCommand::StopMotor => self.send(&encode_motor_pwm(0)).await,
        }
    }

    async fn read_sample(&mut self) -> Result<HalEvent> {
        if !self.scanning {
            return Err(LidarError::Protocol("scan not started".to_string()));
        }

        let mut buf = [0u8; 512];
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            // Only the read itself is awaited; decoded state lives in `self`,
            // so cancelling here loses nothing.
            let n = match timeout(self.timeout_duration, self.port.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    warn!("Serial port returned EOF - device may have been disconnected");
                    return Err(LidarError::DeviceDisconnected(
                        "Serial port returned EOF - device may have been unplugged".to_string(),
                    ));
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    error!("Read error: {}", e);
                    return Err(LidarError::Serial(format!("Read error: {}", e)));
                }
                Err(_) => {
                    return Err(LidarError::Timeout(format!(
                        "no scan data for {} ms",
                        self.timeout_duration.as_millis()
                    )));
                }
            };

            if self.debug_uart {
                debug!("RX: {} bytes", n);
            }
            self.decoder.extend(&buf[..n]);
            self.drain_nodes();
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.scanning {
            self.stop_scan().await?;
        }
        self.send(&encode_motor_pwm(0)).await?;
        debug!(
            "Closed {} ({} bytes skipped while resyncing)",
            self.port_path,
            self.decoder.skipped()
        );
        Ok(())
    }

    fn port_path(&self) -> Option<&str> {
        Some(&self.port_path)
    }
}

/// Opens [`SerialDriver`] sessions, resolving `"auto"` through USB discovery
#[derive(Debug, Clone, Default)]
pub struct SerialDriverFactory {
    debug_uart: bool,
}

impl SerialDriverFactory {
    pub fn new(debug_uart: bool) -> Self {
        Self { debug_uart }
    }
}

#[async_trait]
impl DriverFactory for SerialDriverFactory {
    async fn open(&self, config: &LidarConfig) -> Result<Box<dyn LidarDriver>> {
        let port_path = if config.serial_port == AUTO_PORT {
            find_lidar()?
        } else {
            config.serial_port.clone()
        };

        let mut driver = SerialDriver::new(
            &port_path,
            config.baud_rate,
            config.read_timeout_ms,
            self.debug_uart,
        )?;
        driver.initialize().await?;
        info!("Connected to LiDAR on {}", port_path);

        Ok(Box::new(driver))
    }

    fn mode(&self) -> &'static str {
        "serial"
    }
}

/// Determine if an error indicates device disconnection
///
/// Returns `true` if the error suggests the device has been disconnected
/// (USB unplugged, power loss, etc.) rather than a transient error.
pub fn is_disconnect_error(err: &LidarError) -> bool {
    match err {
        LidarError::DeviceDisconnected(_) => true,
        LidarError::Serial(msg) | LidarError::HardwareFault(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("broken pipe")
                || msg_lower.contains("no such device")
                || msg_lower.contains("device disconnected")
                || msg_lower.contains("device not configured")
                || msg_lower.contains("input/output error")
        }
        _ => false,
    }
}

/// Find the LiDAR's USB-UART bridge by VID/PID
pub fn find_lidar() -> Result<String> {
    debug!(
        "Searching for LiDAR (VID:0x{:04X}, PID:0x{:04X})",
        USB_VID, USB_PID
    );

    let ports = tokio_serial::available_ports().map_err(|e| {
        error!("Failed to enumerate serial ports: {}", e);
        LidarError::Serial(format!("Failed to enumerate ports: {}", e))
    })?;

    for port in ports {
        debug!("Checking port: {}", port.port_name);

        if let tokio_serial::SerialPortType::UsbPort(info) = &port.port_type {
            debug!("  USB Device - VID:{:04X} PID:{:04X}", info.vid, info.pid);

            if info.vid == USB_VID && info.pid == USB_PID {
                info!("Found LiDAR at: {}", port.port_name);
                return Ok(port.port_name);
            }
        }
    }

    error!("No LiDAR found");
    Err(LidarError::DeviceNotFound)
}
