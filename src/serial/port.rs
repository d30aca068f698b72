//! Serial port configuration and connection management
//!
//! Handles port discovery and the connection to the bench controller board.

use anyhow::{Context, Result};
use colored::Colorize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::config::{SerialSection, DEFAULT_BAUD, DEFAULT_PORT};
use crate::error::{BenchError, BenchResult};

/// Configuration for the serial connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB0, COM35)
    pub port_path: String,
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from(DEFAULT_PORT),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Duration::from_millis(500),
        }
    }
}

impl PortConfig {
    /// Create a new configuration with the bench defaults
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Build from the `[serial]` config section
    pub fn from_section(section: &SerialSection) -> Self {
        Self::new(&section.port)
            .with_baud_rate(section.baud_rate)
            .with_timeout(section.read_timeout())
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Exclusively owned connection to the controller board
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> BenchResult<Self> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .map_err(|source| BenchError::SerialOpen {
                port: config.port_path.clone(),
                source,
            })?;

        log::debug!(
            "opened {} at {} baud, read timeout {:?}",
            config.port_path,
            config.baud_rate,
            config.timeout
        );

        Ok(Self { port, config })
    }

    /// Get the port configuration
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Drop anything the board sent before the session started
    pub fn clear_input(&mut self) -> BenchResult<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| BenchError::SerialIo(e.into()))
    }
}

impl Read for SerialConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

/// Information about a detected serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    pub port_type: PortType,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(p: serialport::SerialPortInfo) -> Self {
        let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
            serialport::SerialPortType::UsbPort(info) => (
                PortType::UsbSerial,
                info.manufacturer,
                info.product,
                info.serial_number,
                Some(info.vid),
                Some(info.pid),
            ),
            serialport::SerialPortType::PciPort => {
                (PortType::PciSerial, None, None, None, None, None)
            }
            serialport::SerialPortType::BluetoothPort => {
                (PortType::Bluetooth, None, None, None, None, None)
            }
            serialport::SerialPortType::Unknown => {
                (PortType::Unknown, None, None, None, None, None)
            }
        };

        Self {
            path: p.port_name,
            port_type,
            manufacturer,
            product,
            serial_number,
            vid,
            pid,
        }
    }
}

/// List all available serial ports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().with_context(|| "Failed to enumerate serial ports")?;
    Ok(ports.into_iter().map(PortInfo::from).collect())
}

/// Print formatted list of available serial ports
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Check the USB cable to the bench controller board");
        println!("  2. Check if the device is recognized: ls -la /dev/ttyUSB* /dev/ttyACM*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        return Ok(());
    }

    println!("{}", "Available Serial Ports:".green().bold());
    println!("{}", "=".repeat(60));

    for port in ports {
        println!("\n{}: {}", "Port".cyan(), port.path.white().bold());
        println!("  Type: {}", port.port_type);

        if let Some(ref mfg) = port.manufacturer {
            println!("  Manufacturer: {}", mfg);
        }
        if let Some(ref prod) = port.product {
            println!("  Product: {}", prod);
        }
        if let Some(ref sn) = port.serial_number {
            println!("  Serial: {}", sn);
        }
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            println!("  VID:PID: {:04x}:{:04x}", vid, pid);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "{}",
        "Use: battery-bench run -p <PORT> to start a discharge run".yellow()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.port_path, DEFAULT_PORT);
        assert_eq!(config.flow_control, FlowControl::None);
    }

    #[test]
    fn test_config_builder() {
        let config = PortConfig::new("/dev/ttyACM0")
            .with_baud_rate(9600)
            .with_timeout(Duration::from_secs(1));

        assert_eq!(config.port_path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_from_section() {
        let section = SerialSection {
            port: "COM7".to_string(),
            baud_rate: 57600,
            read_timeout_ms: 250,
        };
        let config = PortConfig::from_section(&section);

        assert_eq!(config.port_path, "COM7");
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_open_missing_port_is_open_error() {
        let config = PortConfig::new("/dev/battery-bench-does-not-exist");
        match SerialConnection::open(config) {
            Err(BenchError::SerialOpen { port, .. }) => {
                assert_eq!(port, "/dev/battery-bench-does-not-exist")
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opening a missing port should fail"),
        }
    }
}
