//! Framed binary protocol: `AA 55 <len> <payload:len> <crc8>`
//!
//! The payload carries 8 pot bytes, one status bit-field (bit 0 switch 1,
//! bit 1 switch 2, bit 2 calibration) and 2 reserved bytes.

use super::{crc8, DecodeDiagnostics, DropReason, Frame, FrameDecoder, WireFormat, POT_COUNT};
use tracing::debug;

/// Two-byte marker that starts every frame
pub const SYNC: [u8; 2] = [0xAA, 0x55];

/// Largest length byte accepted before the checksum is even looked at
pub const MAX_PAYLOAD_LEN: usize = 32;

/// Payload size of a telemetry frame
pub const PAYLOAD_LEN: usize = 11;

/// Receive buffer bound; oldest bytes are dropped beyond it
pub const MAX_BUFFERED: usize = 4096;

const HEADER_LEN: usize = SYNC.len() + 1;

const STATUS_SWITCH_1: u8 = 0x01;
const STATUS_SWITCH_2: u8 = 0x02;
const STATUS_CALIBRATION: u8 = 0x04;

/// Decoder for sync-marked, CRC protected frames
#[derive(Debug, Default)]
pub struct BinaryFrameDecoder {
    buffer: Vec<u8>,
    diagnostics: DecodeDiagnostics,
}

impl BinaryFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    // Drops everything in front of the next sync marker. Returns false when no
    // complete marker is buffered; a trailing 0xAA is kept for the next read.
    fn seek_sync(&mut self) -> bool {
        match self.buffer.windows(SYNC.len()).position(|w| w == SYNC) {
            Some(start) => {
                self.buffer.drain(..start);
                true
            }
            None => {
                let keep = usize::from(self.buffer.last() == Some(&SYNC[0]));
                let discard = self.buffer.len() - keep;
                self.buffer.drain(..discard);
                false
            }
        }
    }
}

impl FrameDecoder for BinaryFrameDecoder {
    fn next_frame(&mut self, incoming: &[u8]) -> Option<Frame> {
        self.buffer.extend_from_slice(incoming);

        if self.buffer.len() > MAX_BUFFERED {
            let excess = self.buffer.len() - MAX_BUFFERED;
            self.buffer.drain(..excess);
            self.diagnostics
                .record_drop(DropReason::Overflow, format!("{} stale bytes", excess));
        }

        loop {
            if !self.seek_sync() {
                return None;
            }

            let Some(&length) = self.buffer.get(SYNC.len()) else {
                return None;
            };
            let length = usize::from(length);

            if !(1..=MAX_PAYLOAD_LEN).contains(&length) {
                self.diagnostics
                    .record_drop(DropReason::BadLength, format!("length byte {}", length));
                self.buffer.drain(..SYNC.len());
                continue;
            }

            let total = HEADER_LEN + length + 1;
            if self.buffer.len() < total {
                // Truncated so far, wait for the rest
                return None;
            }

            let payload = &self.buffer[HEADER_LEN..HEADER_LEN + length];
            let trailer = self.buffer[HEADER_LEN + length];
            let expected = crc8(payload);

            if expected != trailer {
                self.diagnostics.record_drop(
                    DropReason::CrcMismatch,
                    format!("trailer {:#04x}, computed {:#04x}", trailer, expected),
                );
                self.buffer.drain(..total);
                continue;
            }

            if length != PAYLOAD_LEN {
                self.diagnostics
                    .record_drop(DropReason::PayloadSize, format!("{} byte payload", length));
                self.buffer.drain(..total);
                continue;
            }

            let frame = frame_from_payload(payload);
            self.buffer.drain(..total);
            self.diagnostics.record_frame();
            debug!("Decoded binary frame: {:?}", frame);
            return Some(frame);
        }
    }

    fn diagnostics(&self) -> &DecodeDiagnostics {
        &self.diagnostics
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::Binary
    }
}

fn frame_from_payload(payload: &[u8]) -> Frame {
    let mut pots = [0u8; POT_COUNT];
    pots.copy_from_slice(&payload[..POT_COUNT]);
    let status = payload[POT_COUNT];

    let level = |mask: u8| if status & mask != 0 { u8::MAX } else { 0 };
    Frame::new(
        pots,
        [level(STATUS_SWITCH_1), level(STATUS_SWITCH_2)],
        status & STATUS_CALIBRATION != 0,
    )
}

/// Builds the status byte of a telemetry payload
pub fn status_byte(switch_1: bool, switch_2: bool, calibration: bool) -> u8 {
    let mut status = 0;
    if switch_1 {
        status |= STATUS_SWITCH_1;
    }
    if switch_2 {
        status |= STATUS_SWITCH_2;
    }
    if calibration {
        status |= STATUS_CALIBRATION;
    }
    status
}

/// Encodes a complete frame the way the controller firmware sends it
///
/// Used by device simulators and tests; reserved bytes are sent as zero.
pub fn encode_frame(pots: [u8; POT_COUNT], status: u8) -> Vec<u8> {
    let mut payload = Vec::with_capacity(PAYLOAD_LEN);
    payload.extend_from_slice(&pots);
    payload.extend_from_slice(&[status, 0, 0]);

    let mut frame = Vec::with_capacity(HEADER_LEN + PAYLOAD_LEN + 1);
    frame.extend_from_slice(&SYNC);
    frame.push(PAYLOAD_LEN as u8);
    frame.extend_from_slice(&payload);
    frame.push(crc8(&payload));
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    const POTS: [u8; POT_COUNT] = [0, 32, 64, 96, 128, 160, 192, 255];

    #[test]
    fn decodes_valid_frame() {
        let mut decoder = BinaryFrameDecoder::new();
        let bytes = encode_frame(POTS, status_byte(true, false, true));
        let frame = decoder.next_frame(&bytes).unwrap();

        assert_eq!(frame.pots(), POTS);
        assert_eq!(frame.switches(), [255, 0]);
        assert!(frame.calibration());
        assert_eq!(decoder.diagnostics().frames, 1);
    }

    #[test]
    fn corrupted_payload_byte_is_rejected() {
        let clean = encode_frame(POTS, status_byte(false, true, false));
        for index in HEADER_LEN..HEADER_LEN + PAYLOAD_LEN {
            let mut corrupted = clean.clone();
            corrupted[index] = corrupted[index].wrapping_add(1);

            let mut decoder = BinaryFrameDecoder::new();
            assert!(
                decoder.next_frame(&corrupted).is_none(),
                "corruption at byte {} accepted",
                index
            );
            assert_eq!(decoder.diagnostics().crc_mismatch, 1);
        }
    }

    #[test]
    fn truncated_stream_waits_without_panicking() {
        let bytes = encode_frame(POTS, 0);
        for cut in 0..bytes.len() {
            let mut decoder = BinaryFrameDecoder::new();
            assert!(decoder.next_frame(&bytes[..cut]).is_none());
            assert_eq!(decoder.diagnostics().dropped(), 0);
        }

        let mut decoder = BinaryFrameDecoder::new();
        let (head, tail) = bytes.split_at(7);
        assert!(decoder.next_frame(head).is_none());
        assert_eq!(decoder.next_frame(tail).unwrap().pots(), POTS);
    }

    #[test]
    fn resynchronises_after_noise_and_bad_frame() {
        let mut stream = vec![0x00, 0xAA, 0x13, 0x55];
        let mut bad = encode_frame(POTS, 0);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        stream.extend_from_slice(&bad);
        stream.extend_from_slice(&encode_frame([7; POT_COUNT], status_byte(true, true, false)));

        let mut decoder = BinaryFrameDecoder::new();
        let frame = decoder.next_frame(&stream).unwrap();

        assert_eq!(frame.pots(), [7; POT_COUNT]);
        assert_eq!(frame.switches(), [255, 255]);
        assert_eq!(decoder.diagnostics().crc_mismatch, 1);
    }

    #[test]
    fn invalid_length_byte_is_skipped() {
        let mut stream = vec![0xAA, 0x55, 0x00, 0xAA, 0x55, 0x40];
        stream.extend_from_slice(&encode_frame(POTS, 0));

        let mut decoder = BinaryFrameDecoder::new();
        assert_eq!(decoder.next_frame(&stream).unwrap().pots(), POTS);
        assert_eq!(decoder.diagnostics().bad_length, 2);
    }

    #[test]
    fn valid_checksum_with_wrong_payload_size_is_dropped() {
        let payload = [1u8, 2, 3, 4];
        let mut stream = vec![0xAA, 0x55, payload.len() as u8];
        stream.extend_from_slice(&payload);
        stream.push(crc8(&payload));

        let mut decoder = BinaryFrameDecoder::new();
        assert!(decoder.next_frame(&stream).is_none());
        assert_eq!(decoder.diagnostics().payload_size, 1);
    }

    #[test]
    fn sync_split_across_reads() {
        let bytes = encode_frame(POTS, 0);
        let mut decoder = BinaryFrameDecoder::new();

        let mut first = vec![0x11, 0x22];
        first.push(bytes[0]);
        assert!(decoder.next_frame(&first).is_none());
        assert_eq!(decoder.next_frame(&bytes[1..]).unwrap().pots(), POTS);
    }

    #[test]
    fn back_to_back_frames_drain_in_order() {
        let mut stream = encode_frame([1; POT_COUNT], 0);
        stream.extend_from_slice(&encode_frame([2; POT_COUNT], 0));

        let mut decoder = BinaryFrameDecoder::new();
        assert_eq!(decoder.next_frame(&stream).unwrap().pots(), [1; POT_COUNT]);
        assert_eq!(decoder.next_frame(&[]).unwrap().pots(), [2; POT_COUNT]);
        assert!(decoder.next_frame(&[]).is_none());
    }

    #[test]
    fn buffer_stays_bounded_under_noise() {
        let mut decoder = BinaryFrameDecoder::new();
        let noise = vec![0xAAu8; MAX_BUFFERED * 2];
        assert!(decoder.next_frame(&noise).is_none());
        assert!(decoder.buffer.len() <= MAX_BUFFERED);
    }
}
