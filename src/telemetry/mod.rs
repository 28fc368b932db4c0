//! Telemetry decoding for the serial controller link
//!
//! Turns the raw byte stream of the serial transport into validated [`Frame`]s.
//! Two wire formats are supported and selected explicitly through [`WireFormat`]:
//!
//! 1. [`text`] - `p0,p1,p2,p3,p4,p5,p6,p7,s1,s2\n` lines of decimal integers
//! 2. [`binary`] - `AA 55 <len> <payload> <crc8>` frames with an integrity check
//!
//! # Architecture
//!
//! ```text
//! Transport bytes ──► FrameDecoder ──► Frame ──► BridgeLoop
//!                     (buffer, validate, count drops)
//! ```
//!
//! Malformed input never surfaces as an error. Decoders count every discarded
//! unit in [`DecodeDiagnostics`] and only log the first few occurrences.

pub mod binary;
pub mod crc;
pub mod text;

pub use binary::BinaryFrameDecoder;
pub use crc::crc8;
pub use text::TextLineDecoder;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Number of potentiometer channels carried by every frame
pub const POT_COUNT: usize = 8;

/// Number of switch channels carried by every frame
pub const SWITCH_COUNT: usize = 2;

/// Only this many discarded units are logged per decoder
pub const MAX_LOGGED_DROPS: u64 = 3;

/// One validated unit of controller telemetry
///
/// Frames are only built by the decoders in this module after the payload
/// passed its integrity checks, and are never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pots: [u8; POT_COUNT],
    switches: [u8; SWITCH_COUNT],
    calibration: bool,
}

impl Frame {
    pub(crate) fn new(pots: [u8; POT_COUNT], switches: [u8; SWITCH_COUNT], calibration: bool) -> Self {
        Self {
            pots,
            switches,
            calibration,
        }
    }

    /// Potentiometer readings in fixed axis order
    pub fn pots(&self) -> [u8; POT_COUNT] {
        self.pots
    }

    /// Raw switch readings (binary frames expand each status bit to 0 or 255)
    pub fn switches(&self) -> [u8; SWITCH_COUNT] {
        self.switches
    }

    /// Calibration flag from the binary status byte, always false for text frames
    pub fn calibration(&self) -> bool {
        self.calibration
    }
}

/// Wire representation used on the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Comma separated decimal line terminated by `\n`
    #[default]
    Text,
    /// Sync marker, length, payload and CRC-8 trailer
    Binary,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Text => write!(f, "text"),
            WireFormat::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(WireFormat::Text),
            "binary" => Ok(WireFormat::Binary),
            other => Err(format!("unknown wire format '{}' (expected text or binary)", other)),
        }
    }
}

/// Reason a chunk of input was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Text line without exactly ten fields
    FieldCount,
    /// Text field that is not an integer
    NonInteger,
    /// Binary length byte outside 1..=32
    BadLength,
    /// Binary trailer does not match the payload checksum
    CrcMismatch,
    /// Binary payload passed its checksum but is not 11 bytes long
    PayloadSize,
    /// Receive buffer exceeded its bound without yielding a frame
    Overflow,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::FieldCount => write!(f, "wrong field count"),
            DropReason::NonInteger => write!(f, "non-integer field"),
            DropReason::BadLength => write!(f, "invalid length byte"),
            DropReason::CrcMismatch => write!(f, "checksum mismatch"),
            DropReason::PayloadSize => write!(f, "unexpected payload size"),
            DropReason::Overflow => write!(f, "buffer overflow"),
        }
    }
}

/// Counters for decoded frames and discarded input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeDiagnostics {
    pub frames: u64,
    pub field_count: u64,
    pub non_integer: u64,
    pub bad_length: u64,
    pub crc_mismatch: u64,
    pub payload_size: u64,
    pub overflow: u64,
}

impl DecodeDiagnostics {
    /// Total number of discarded units across all reasons
    pub fn dropped(&self) -> u64 {
        self.field_count
            + self.non_integer
            + self.bad_length
            + self.crc_mismatch
            + self.payload_size
            + self.overflow
    }

    pub(crate) fn record_frame(&mut self) {
        self.frames += 1;
    }

    pub(crate) fn record_drop(&mut self, reason: DropReason, detail: impl fmt::Display) {
        let counter = match reason {
            DropReason::FieldCount => &mut self.field_count,
            DropReason::NonInteger => &mut self.non_integer,
            DropReason::BadLength => &mut self.bad_length,
            DropReason::CrcMismatch => &mut self.crc_mismatch,
            DropReason::PayloadSize => &mut self.payload_size,
            DropReason::Overflow => &mut self.overflow,
        };
        *counter += 1;

        let dropped = self.dropped();
        if dropped <= MAX_LOGGED_DROPS {
            info!("Ignored telemetry ({}): {}", reason, detail);
            if dropped == MAX_LOGGED_DROPS {
                info!("Further discarded telemetry is counted but not logged");
            }
        } else {
            debug!("Ignored telemetry ({}), {} dropped so far", reason, dropped);
        }
    }
}

/// Strategy interface shared by both wire formats
///
/// Each call appends `incoming` to the decoder's buffer and yields at most one
/// frame. Passing an empty slice drains frames that are already buffered.
pub trait FrameDecoder: Send {
    fn next_frame(&mut self, incoming: &[u8]) -> Option<Frame>;

    fn diagnostics(&self) -> &DecodeDiagnostics;

    fn wire_format(&self) -> WireFormat;
}

/// Creates the decoder strategy for the selected wire format
pub fn decoder_for(format: WireFormat) -> Box<dyn FrameDecoder> {
    debug!("Creating {} frame decoder", format);
    match format {
        WireFormat::Text => Box::new(TextLineDecoder::new()),
        WireFormat::Binary => Box::new(BinaryFrameDecoder::new()),
    }
}
