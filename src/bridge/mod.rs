//! Bridge subsystem: serial telemetry to virtual joystick and key taps
//!
//! 1. [`connector`] - acquires transport, joystick and key sinks for one run
//! 2. [`bridge_loop`] - typestate worker: decode, condition, drive sinks, watchdog
//! 3. [`bridge_handle`] - spawns the worker, exposes status and telemetry, stops it
//!
//! # Architecture
//!
//! ```text
//! Transport ──► FrameDecoder ──► AxisMapper ×8 ───► JoystickSink (axes + buttons)
//!                            └─► SwitchFilter ×2 ─┬► JoystickSink
//!                                                 └► edge detector ──► KeySink
//!                                  (throttled) ──► watch<TelemetrySnapshot>
//! ```
//!
//! The worker runs on a dedicated blocking thread and exclusively owns the
//! transport and both sinks for the lifetime of a run.

pub mod bridge_handle;
pub mod bridge_loop;
pub mod connector;
pub mod error;
pub mod sink;
pub mod transport;

pub use bridge_handle::BridgeHandle;
pub use bridge_loop::{run_bridge, BridgeLoop, BridgeState, RunSummary, StepOutcome};
pub use connector::{Connector, SerialConnector};
pub use error::{BridgeError, KeyError, SinkError, TransportError};
pub use sink::{
    Axis, JoystickSink, JoystickState, KeySink, TracingJoystickSink, TracingKeySink,
};
pub use transport::{list_ports, PortInfo, SerialTransport, Transport};

use crate::telemetry::{POT_COUNT, SWITCH_COUNT};
use chrono::{DateTime, Local};
use std::fmt;

/// Lifecycle of a bridge run as seen from outside the worker
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BridgeStatus {
    #[default]
    Idle,
    Connecting,
    Running,
    /// No telemetry within the idle timeout, outputs held neutral
    TimeoutNeutral,
    Stopping,
    Stopped,
    /// The run ended on a fatal error
    Failed(String),
}

impl BridgeStatus {
    /// True while the worker owns a connected transport
    pub fn is_active(&self) -> bool {
        matches!(self, BridgeStatus::Running | BridgeStatus::TimeoutNeutral)
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeStatus::Idle => write!(f, "idle"),
            BridgeStatus::Connecting => write!(f, "connecting"),
            BridgeStatus::Running => write!(f, "running"),
            BridgeStatus::TimeoutNeutral => write!(f, "no data (neutral)"),
            BridgeStatus::Stopping => write!(f, "stopping"),
            BridgeStatus::Stopped => write!(f, "stopped"),
            BridgeStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Read-only copy of the latest telemetry for monitors
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    /// Raw pot readings of the last decoded frame
    pub pots: [u8; POT_COUNT],
    /// Filtered switch states
    pub switches: [bool; SWITCH_COUNT],
    pub calibration: bool,
    pub timestamp: DateTime<Local>,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            pots: [0; POT_COUNT],
            switches: [false; SWITCH_COUNT],
            calibration: false,
            timestamp: Local::now(),
        }
    }
}
