//! RPLIDAR serial protocol
//!
//! Request packets are `0xA5 <cmd>` optionally followed by
//! `<size> <payload...> <checksum>`, where the checksum is the XOR of every
//! preceding byte. Responses start with a 7-byte descriptor
//! (`0xA5 0x5A`, 30-bit length + 2-bit send mode, data type) followed by the
//! payload. A running scan streams 5-byte measurement nodes.

use lidar_core::{LidarError, Result, Sample};

/// Request start flag
pub const SYNC_BYTE: u8 = 0xA5;
/// Second byte of every response descriptor
pub const SYNC_BYTE2: u8 = 0x5A;

/// Length of a response descriptor
pub const DESCRIPTOR_LEN: usize = 7;
/// Length of a standard scan measurement node
pub const SCAN_NODE_LEN: usize = 5;

/// Request commands understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Stop = 0x25,
    Reset = 0x40,
    Scan = 0x20,
    GetInfo = 0x50,
    GetHealth = 0x52,
    SetMotorPwm = 0xF0,
}

/// Response data types
pub const RESPONSE_TYPE_SCAN: u8 = 0x81;
pub const RESPONSE_TYPE_INFO: u8 = 0x04;
pub const RESPONSE_TYPE_HEALTH: u8 = 0x06;

/// Build a request packet
pub fn encode_request(command: Command, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![SYNC_BYTE, command as u8];
    if payload.is_empty() {
        return packet;
    }

    packet.push(payload.len() as u8);
    packet.extend_from_slice(payload);
    let checksum = packet.iter().fold(0u8, |acc, b| acc ^ b);
    packet.push(checksum);
    packet
}

/// Build the motor PWM request (duty is little-endian u16)
pub fn encode_motor_pwm(duty: u16) -> Vec<u8> {
    encode_request(Command::SetMotorPwm, &duty.to_le_bytes())
}

/// Whether a response streams multiple payloads or answers once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Single,
    Multiple,
}

/// Parsed response descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub length: u32,
    pub mode: SendMode,
    pub data_type: u8,
}

impl Descriptor {
    /// Parse a 7-byte descriptor
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DESCRIPTOR_LEN {
            return Err(LidarError::Protocol(format!(
                "descriptor must be {} bytes, got {}",
                DESCRIPTOR_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != SYNC_BYTE || bytes[1] != SYNC_BYTE2 {
            return Err(LidarError::Protocol(format!(
                "bad descriptor sync {:02X} {:02X}",
                bytes[0], bytes[1]
            )));
        }

        let raw = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let mode = match raw >> 30 {
            0 => SendMode::Single,
            1 => SendMode::Multiple,
            other => {
                return Err(LidarError::Protocol(format!(
                    "unknown send mode {}",
                    other
                )))
            }
        };

        Ok(Self {
            length: raw & 0x3FFF_FFFF,
            mode,
            data_type: bytes[6],
        })
    }

    /// Check the descriptor against what a request expects
    pub fn expect(&self, data_type: u8, length: u32, mode: SendMode) -> Result<()> {
        if self.data_type != data_type || self.length != length || self.mode != mode {
            return Err(LidarError::Protocol(format!(
                "unexpected descriptor: type 0x{:02X} len {} {:?} (wanted 0x{:02X} len {} {:?})",
                self.data_type, self.length, self.mode, data_type, length, mode
            )));
        }
        Ok(())
    }
}

/// Device identification returned by GET_INFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: u8,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub hardware: u8,
    pub serial_number: String,
}

impl DeviceInfo {
    pub const LEN: usize = 20;

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(LidarError::Protocol(format!(
                "device info must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }

        let serial_number = bytes[4..20]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<String>();

        Ok(Self {
            model: bytes[0],
            firmware_minor: bytes[1],
            firmware_major: bytes[2],
            hardware: bytes[3],
            serial_number,
        })
    }
}

/// Self-test status returned by GET_HEALTH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Good,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHealth {
    pub status: HealthStatus,
    pub error_code: u16,
}

impl DeviceHealth {
    pub const LEN: usize = 3;

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(LidarError::Protocol(format!(
                "health must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }

        let status = match bytes[0] {
            0 => HealthStatus::Good,
            1 => HealthStatus::Warning,
            2 => HealthStatus::Error,
            other => {
                return Err(LidarError::Protocol(format!(
                    "unknown health status {}",
                    other
                )))
            }
        };

        Ok(Self {
            status,
            error_code: u16::from_le_bytes([bytes[1], bytes[2]]),
        })
    }
}

/// A decoded measurement node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanNode {
    /// First node of a new rotation
    pub start: bool,
    pub sample: Sample,
}

/// Decode one 5-byte scan node.
///
/// Returns `None` when the start/inverse-start or check bits are
/// inconsistent, which means the stream is out of sync.
pub fn decode_scan_node(bytes: &[u8; SCAN_NODE_LEN]) -> Option<ScanNode> {
    let start = bytes[0] & 0x01 != 0;
    let inverse_start = bytes[0] & 0x02 != 0;
    if start == inverse_start {
        return None;
    }
    if bytes[1] & 0x01 != 1 {
        return None;
    }

    let quality = bytes[0] >> 2;
    let angle_q6 = ((bytes[1] as u16) >> 1) | ((bytes[2] as u16) << 7);
    let distance_q2 = u16::from_le_bytes([bytes[3], bytes[4]]);

    Some(ScanNode {
        start,
        sample: Sample::new(
            angle_q6 as f32 / 64.0,
            distance_q2 as f32 / 4.0,
            quality,
        ),
    })
}

/// Incremental decoder for the measurement stream.
///
/// Bytes are buffered across reads, so a node split over two reads decodes
/// once the rest arrives. Bytes that cannot start a valid node are skipped
/// one at a time until the stream resynchronizes.
#[derive(Debug, Default)]
pub struct NodeDecoder {
    buffer: Vec<u8>,
    skipped: u64,
}

impl NodeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the port
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Take the next complete node, if any
    pub fn next_node(&mut self) -> Option<ScanNode> {
        let mut offset = 0;
        let mut found = None;

        while self.buffer.len() - offset >= SCAN_NODE_LEN {
            let mut node = [0u8; SCAN_NODE_LEN];
            node.copy_from_slice(&self.buffer[offset..offset + SCAN_NODE_LEN]);
            if let Some(decoded) = decode_scan_node(&node) {
                offset += SCAN_NODE_LEN;
                found = Some(decoded);
                break;
            }
            offset += 1;
            self.skipped += 1;
        }

        self.buffer.drain(..offset);
        found
    }

    /// Drop buffered bytes (after STOP or before a new scan)
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Bytes discarded while resynchronizing
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[cfg(test)]
pub(crate) fn encode_scan_node(start: bool, quality: u8, angle: f32, distance: f32) -> [u8; 5] {
    let angle_q6 = (angle * 64.0) as u16;
    let distance_q2 = (distance * 4.0) as u16;
    let flags = if start { 0x01 } else { 0x02 };
    let [d0, d1] = distance_q2.to_le_bytes();
    [
        (quality << 2) | flags,
        ((angle_q6 << 1) as u8) | 0x01,
        (angle_q6 >> 7) as u8,
        d0,
        d1,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_simple_request() {
        assert_eq!(encode_request(Command::Stop, &[]), vec![0xA5, 0x25]);
        assert_eq!(encode_request(Command::Scan, &[]), vec![0xA5, 0x20]);
    }

    #[test]
    fn test_encode_motor_pwm_checksum() {
        // 660 = 0x0294
        let packet = encode_motor_pwm(660);
        assert_eq!(packet[..5], [0xA5, 0xF0, 0x02, 0x94, 0x02]);
        assert_eq!(packet[5], 0xA5 ^ 0xF0 ^ 0x02 ^ 0x94 ^ 0x02);
    }

    #[test]
    fn test_parse_scan_descriptor() {
        let desc = Descriptor::parse(&[0xA5, 0x5A, 0x05, 0x00, 0x00, 0x40, 0x81]).unwrap();
        assert_eq!(desc.length, 5);
        assert_eq!(desc.mode, SendMode::Multiple);
        assert_eq!(desc.data_type, RESPONSE_TYPE_SCAN);
        assert!(desc
            .expect(RESPONSE_TYPE_SCAN, SCAN_NODE_LEN as u32, SendMode::Multiple)
            .is_ok());
        assert!(desc
            .expect(RESPONSE_TYPE_HEALTH, 3, SendMode::Single)
            .is_err());
    }

    #[test]
    fn test_parse_descriptor_bad_sync() {
        let err = Descriptor::parse(&[0xA5, 0x00, 0x05, 0x00, 0x00, 0x40, 0x81]).unwrap_err();
        assert!(matches!(err, LidarError::Protocol(_)));
    }

    #[test]
    fn test_parse_info_and_health() {
        let mut info = vec![0x18, 0x1D, 0x01, 0x05];
        info.extend(0u8..16);
        let info = DeviceInfo::parse(&info).unwrap();
        assert_eq!(info.model, 0x18);
        assert_eq!(info.firmware_major, 1);
        assert_eq!(info.firmware_minor, 0x1D);
        assert_eq!(info.serial_number.len(), 32);

        let health = DeviceHealth::parse(&[0x02, 0x34, 0x12]).unwrap();
        assert_eq!(health.status, HealthStatus::Error);
        assert_eq!(health.error_code, 0x1234);
    }

    #[test]
    fn test_decode_scan_node() {
        let bytes = encode_scan_node(true, 47, 90.5, 1200.5);
        let node = decode_scan_node(&bytes).unwrap();
        assert!(node.start);
        assert_eq!(node.sample.intensity, 47);
        assert!((node.sample.angle - 90.5).abs() < 1.0 / 64.0);
        assert_eq!(node.sample.distance, 1200.5);
    }

    #[test]
    fn test_decode_rejects_inconsistent_flags() {
        let mut bytes = encode_scan_node(false, 10, 10.0, 100.0);
        bytes[0] |= 0x01; // start and inverse start both set
        assert!(decode_scan_node(&bytes).is_none());

        let mut bytes = encode_scan_node(false, 10, 10.0, 100.0);
        bytes[1] &= !0x01; // check bit cleared
        assert!(decode_scan_node(&bytes).is_none());
    }

    #[test]
    fn test_decoder_handles_split_reads() {
        let bytes = encode_scan_node(false, 20, 45.0, 500.0);
        let mut decoder = NodeDecoder::new();

        decoder.extend(&bytes[..3]);
        assert!(decoder.next_node().is_none());

        decoder.extend(&bytes[3..]);
        let node = decoder.next_node().unwrap();
        assert_eq!(node.sample.distance, 500.0);
        assert!(decoder.next_node().is_none());
    }

    #[test]
    fn test_decoder_resynchronizes() {
        let mut decoder = NodeDecoder::new();
        decoder.extend(&[0x00, 0xFF]);
        decoder.extend(&encode_scan_node(true, 5, 1.0, 10.0));
        decoder.extend(&encode_scan_node(false, 5, 2.0, 20.0));

        let first = decoder.next_node().unwrap();
        assert!(first.start);
        assert_eq!(first.sample.distance, 10.0);
        let second = decoder.next_node().unwrap();
        assert_eq!(second.sample.distance, 20.0);
        assert!(decoder.skipped() >= 2);
    }
}
