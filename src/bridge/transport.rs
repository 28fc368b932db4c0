//! Byte transports feeding the frame decoder

use super::error::TransportError;
use crate::config::SerialConfig;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::io::{ErrorKind, Read};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of raw telemetry bytes
pub trait Transport: Send {
    /// Reads available bytes into `buf`
    ///
    /// Blocks for at most the configured read timeout. A timeout without data
    /// returns `Ok(0)`; any other failure is an error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Human readable endpoint name for logs
    fn name(&self) -> &str;
}

/// 8N1 serial port without flow control
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        info!("Opening serial port {} @ {} baud", config.port, config.baud);

        let port = serialport::new(&config.port, config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|e| TransportError::Open {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        // Stale bytes from before the open would decode as old telemetry
        if let Err(e) = port.clear(ClearBuffer::Input) {
            warn!("Could not flush input buffer of {}: {}", config.port, e);
        }

        Ok(Self {
            port,
            name: config.port.clone(),
        })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(TransportError::Read(e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        debug!("Serial port {} closed", self.name);
    }
}

/// A serial port visible to the operating system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

/// Enumerates serial ports for the `list-ports` command
pub fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = serialport::available_ports().map_err(|e| TransportError::Open {
        port: "<enumerate>".to_string(),
        reason: e.to_string(),
    })?;

    Ok(ports
        .into_iter()
        .map(|port| PortInfo {
            description: describe(&port.port_type),
            name: port.port_name,
        })
        .collect())
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("USB serial");
            format!("{} ({:04x}:{:04x})", product, usb.vid, usb.pid)
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "Unknown".to_string(),
    }
}
