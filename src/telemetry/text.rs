//! Line protocol: `p0,p1,p2,p3,p4,p5,p6,p7,s1,s2\n`

use super::{
    DecodeDiagnostics, DropReason, Frame, FrameDecoder, WireFormat, POT_COUNT, SWITCH_COUNT,
};
use std::num::IntErrorKind;
use tracing::debug;

/// Fields per line: eight pots followed by two switches
pub const FIELD_COUNT: usize = POT_COUNT + SWITCH_COUNT;

/// Longest partial line kept while waiting for its terminator
pub const MAX_LINE_LENGTH: usize = 256;

/// Decoder for newline terminated CSV telemetry
#[derive(Debug, Default)]
pub struct TextLineDecoder {
    buffer: Vec<u8>,
    diagnostics: DecodeDiagnostics,
}

impl TextLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for TextLineDecoder {
    fn next_frame(&mut self, incoming: &[u8]) -> Option<Frame> {
        self.buffer.extend_from_slice(incoming);

        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut raw: Vec<u8> = self.buffer.drain(..=end).collect();
            // Boot noise and line glitches are dropped byte by byte, not per line
            raw.retain(u8::is_ascii);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_line(line) {
                Ok(frame) => {
                    self.diagnostics.record_frame();
                    debug!("Decoded text frame: {:?}", frame);
                    return Some(frame);
                }
                Err(reason) => self.diagnostics.record_drop(reason, format!("'{}'", line)),
            }
        }

        if self.buffer.len() > MAX_LINE_LENGTH {
            let discarded = self.buffer.len();
            self.buffer.clear();
            self.diagnostics
                .record_drop(DropReason::Overflow, format!("{} bytes without line break", discarded));
        }

        None
    }

    fn diagnostics(&self) -> &DecodeDiagnostics {
        &self.diagnostics
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::Text
    }
}

/// Parses one trimmed line into a frame
///
/// Values outside 0..=255 are clamped into range, including integers too
/// large for `i64`. Any field that is not an integer, or a field count other
/// than ten, rejects the whole line.
pub fn parse_line(line: &str) -> Result<Frame, DropReason> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(DropReason::FieldCount);
    }

    let mut values = [0u8; FIELD_COUNT];
    for (slot, field) in values.iter_mut().zip(&fields) {
        *slot = parse_clamped(field.trim())?;
    }

    let mut pots = [0u8; POT_COUNT];
    pots.copy_from_slice(&values[..POT_COUNT]);
    let switches = [values[POT_COUNT], values[POT_COUNT + 1]];

    Ok(Frame::new(pots, switches, false))
}

fn parse_clamped(field: &str) -> Result<u8, DropReason> {
    match field.parse::<i64>() {
        Ok(value) => Ok(value.clamp(0, 255) as u8),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(u8::MAX),
            IntErrorKind::NegOverflow => Ok(0),
            _ => Err(DropReason::NonInteger),
        },
    }
}
