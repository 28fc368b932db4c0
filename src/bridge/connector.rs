//! Resource acquisition for a bridge run

use super::error::{SinkError, TransportError};
use super::sink::{JoystickSink, KeySink, TracingJoystickSink, TracingKeySink};
use super::transport::{SerialTransport, Transport};
use crate::config::SerialConfig;

/// Opens the transport and sinks a run exclusively owns
///
/// The bridge only talks to these traits, so a test harness or another
/// platform backend can replace the serial port and the virtual devices.
pub trait Connector: Send {
    fn open_joystick(&mut self, device_id: u32) -> Result<Box<dyn JoystickSink>, SinkError>;

    fn open_transport(
        &mut self,
        serial: &SerialConfig,
    ) -> Result<Box<dyn Transport>, TransportError>;

    fn open_keys(&mut self) -> Box<dyn KeySink>;
}

/// Real serial port with tracing-backed virtual devices
#[derive(Debug, Default)]
pub struct SerialConnector;

impl SerialConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SerialConnector {
    fn open_joystick(&mut self, device_id: u32) -> Result<Box<dyn JoystickSink>, SinkError> {
        Ok(Box::new(TracingJoystickSink::new(device_id)))
    }

    fn open_transport(
        &mut self,
        serial: &SerialConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(SerialTransport::open(serial)?))
    }

    fn open_keys(&mut self) -> Box<dyn KeySink> {
        Box::new(TracingKeySink::new())
    }
}
