//! Error types of the bridge subsystem
//!
//! Only connection establishment and joystick output failures end a run.
//! Malformed telemetry never becomes an error value, and key injection
//! failures are logged where they happen.

use std::time::Duration;
use thiserror::Error;

/// Serial transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Virtual joystick failures
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to open virtual joystick {device_id}: {reason}")]
    Open { device_id: u32, reason: String },

    #[error("Failed to update virtual joystick: {0}")]
    Update(String),
}

/// Key injection failure, local to one tap
#[derive(Debug, Error)]
#[error("Failed to send key '{key}': {reason}")]
pub struct KeyError {
    pub key: String,
    pub reason: String,
}

/// Errors that end a bridge run or a stop request
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The serial transport could not be opened; the run never started
    #[error("Transport unavailable: {0}")]
    TransportOpen(#[source] TransportError),

    /// The virtual joystick could not be opened; the run never started
    #[error("Virtual joystick unavailable: {0}")]
    JoystickOpen(#[source] SinkError),

    /// The virtual joystick stopped accepting updates
    #[error("Output sink failure: {0}")]
    OutputSink(#[source] SinkError),

    /// The transport failed with something other than a read timeout
    #[error("Transport failure: {0}")]
    TransportRead(#[source] TransportError),

    /// A resource the current state requires is missing
    #[error("Invalid bridge state: {0}")]
    InvalidState(String),

    #[error("Bridge worker did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("Bridge worker failed: {0}")]
    Worker(String),

    #[error("Bridge is not running")]
    NotRunning,
}
