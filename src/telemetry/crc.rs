//! CRC-8 used by the binary wire format
//!
//! Reflected polynomial 0x8C (0x31 unreflected), initial value 0x00, no final
//! XOR. These are the CRC-8/MAXIM-DOW parameters, so the `crc` crate catalogue
//! entry is used directly.

use crc::{Crc, CRC_8_MAXIM_DOW};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// Checksum of a binary frame payload
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}
