//! Serial port link
//!
//! Opens the controller's serial device and exposes it as a line-oriented
//! [`ByteStream`]. The reference boards run at 115200 baud, 8N1, and
//! terminate lines with `\r`, `\n`, or both.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Baud rate, parity, and stop bit configuration
//! - Blocking writes and timed line reads

use super::ByteStream;
use romiserial_core::{ConnectionError, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a serial link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkParams {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Hardware flow control
    pub flow_control: bool,
    /// Timeout for a single read, in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115200,
            data_bits: 8,
            parity: SerialParity::None,
            stop_bits: 1,
            flow_control: false,
            read_timeout_ms: 100,
        }
    }
}

impl LinkParams {
    /// Default parameters for the given port
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Check the parameters before opening the port
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ConnectionError::InvalidParameters { reason };
        if self.port.is_empty() {
            return Err(invalid("port name is empty".to_string()).into());
        }
        if self.baud_rate == 0 {
            return Err(invalid("baud rate must be > 0".to_string()).into());
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(invalid(format!("invalid data bits: {}", self.data_bits)).into());
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(invalid(format!("invalid stop bits: {}", self.stop_bits)).into());
        }
        Ok(())
    }
}

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Arduino Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
        }
    }
}

/// List serial ports that may host a controller board
///
/// Filters ports to the patterns USB microcontroller boards show up under:
/// - Linux: /dev/ttyACM*, /dev/ttyUSB*
/// - macOS: /dev/cu.usbmodem*, /dev/cu.usbserial-*
/// - Windows: COM*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::InvalidParameters {
            reason: format!("failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(|port| {
            let mut info = SerialPortInfo::new(&port.port_name, port_description(port));
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                info.manufacturer = usb.manufacturer.clone();
                info.serial_number = usb.serial_number.clone();
            }
            info
        })
        .collect())
}

fn is_controller_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }
    port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/cu.usbmodem")
        || port_name.starts_with("/dev/cu.usbserial-")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// A serial device opened as a line-oriented byte stream
pub struct SerialLink {
    name: String,
    port: Box<dyn serialport::SerialPort>,
    lines: LineBuffer,
}

impl SerialLink {
    /// Open a serial port with the given parameters
    pub fn open(params: &LinkParams) -> Result<Self> {
        params.validate()?;

        let builder = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.read_timeout_ms))
            .data_bits(match params.data_bits {
                5 => serialport::DataBits::Five,
                6 => serialport::DataBits::Six,
                7 => serialport::DataBits::Seven,
                _ => serialport::DataBits::Eight,
            })
            .stop_bits(if params.stop_bits == 2 {
                serialport::StopBits::Two
            } else {
                serialport::StopBits::One
            })
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            });

        match builder.open() {
            Ok(port) => {
                tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);
                Ok(Self {
                    name: params.port.clone(),
                    port,
                    lines: LineBuffer::default(),
                })
            }
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                Err(ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    /// The port name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ByteStream for SerialLink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.lines.read_from(&mut self.port)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        self.lines.clear();
        Ok(())
    }
}

/// Accumulates bytes and splits them into lines on `\r` or `\n`
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    fn clear(&mut self) {
        self.pending.clear();
    }

    /// Return a buffered line, or read once from `reader` and retry
    ///
    /// `Ok(None)` means the read timed out. A read of zero bytes means the
    /// device went away and is reported as `UnexpectedEof`.
    fn read_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<String>> {
        if let Some(line) = self.next_line() {
            return Ok(Some(line));
        }
        let mut chunk = [0u8; 256];
        match reader.read(&mut chunk) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial port closed",
            )),
            Ok(n) => {
                self.extend(&chunk[..n]);
                Ok(self.next_line())
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            let end = self.pending.iter().position(|&b| b == b'\r' || b == b'\n')?;
            let line: Vec<u8> = self.pending.drain(..=end).take(end).collect();
            if !line.is_empty() {
                return Some(String::from_utf8_lossy(&line).to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_port_patterns() {
        assert!(is_controller_port("/dev/ttyACM0"));
        assert!(is_controller_port("/dev/ttyUSB1"));
        assert!(is_controller_port("/dev/cu.usbmodem14101"));
        assert!(is_controller_port("COM3"));
        assert!(!is_controller_port("COM"));
        assert!(!is_controller_port("COMX"));
        assert!(!is_controller_port("/dev/ttyS0"));
    }

    #[test]
    fn test_link_params_validation() {
        assert!(LinkParams::new("/dev/ttyACM0").validate().is_ok());
        assert!(LinkParams::new("").validate().is_err());
        assert!(LinkParams::new("/dev/ttyACM0")
            .with_baud_rate(0)
            .validate()
            .is_err());

        let mut params = LinkParams::new("/dev/ttyACM0");
        params.stop_bits = 3;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_line_buffer_splits_on_any_terminator() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"#!hello\r\n#[0,");
        assert_eq!(buffer.next_line().as_deref(), Some("#!hello"));
        // Partial line stays buffered
        assert_eq!(buffer.next_line(), None);

        buffer.extend(b"1]\n");
        assert_eq!(buffer.next_line().as_deref(), Some("#[0,1]"));
        assert_eq!(buffer.next_line(), None);
    }

    #[test]
    fn test_line_buffer_reads_until_end_of_stream() {
        let mut buffer = LineBuffer::default();
        let mut reader: &[u8] = b"#[0,1]\r#[0,";
        assert_eq!(
            buffer.read_from(&mut reader).unwrap().as_deref(),
            Some("#[0,1]")
        );
        // Only a partial frame is left when the port closes
        let err = buffer.read_from(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = buffer.read_from(&mut io::empty()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_line_buffer_clear_drops_partial_line() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"#[0,2,2]\r#[0,");
        buffer.clear();
        buffer.extend(b"3]\r");
        assert_eq!(buffer.next_line().as_deref(), Some("3]"));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let err = SerialLink::open(&LinkParams::new("/dev/does-not-exist-romi")).err();
        assert!(matches!(
            err,
            Some(romiserial_core::Error::Connection(
                ConnectionError::FailedToOpen { .. }
            ))
        ));
    }
}
