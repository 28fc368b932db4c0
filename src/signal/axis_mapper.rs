//! Pot reading to virtual joystick axis conversion

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Smallest axis value ever emitted; many consumers read 0 as "uncalibrated"
pub const AXIS_MIN: u16 = 1;

/// Largest axis value
pub const AXIS_MAX: u16 = 32767;

/// Output for a centered axis, the midpoint of `AXIS_MIN..=AXIS_MAX`
pub const AXIS_CENTER: u16 = 16384;

const RAW_MAX: i32 = 255;

/// Per-axis calibration, fixed for the duration of a run
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AxisConfig {
    /// Extra codes on each side of the two middle codes (127, 128) that snap to center
    pub deadzone: u8,
    pub invert: bool,
    /// Moving average window, 0 disables smoothing
    pub smoothing: usize,
}

/// Converts one raw pot reading into an axis value
///
/// Codes `127 - deadzone ..= 128 + deadzone` straddle the electrical center
/// 127.5 and all emit [`AXIS_CENTER`]; the band is symmetric, so inversion
/// leaves centered readings untouched. Everything else is inverted if
/// requested and scaled with `round(v / 255 * 32767)`, clamped to
/// [`AXIS_MIN`]..=[`AXIS_MAX`].
pub fn scale_axis(value: u8, deadzone: u8, invert: bool) -> u16 {
    let band_low = 127 - i32::from(deadzone);
    let band_high = 128 + i32::from(deadzone);
    if (band_low..=band_high).contains(&i32::from(value)) {
        return AXIS_CENTER;
    }

    let value = if invert { u8::MAX - value } else { value };
    let scaled = (f64::from(value) / 255.0 * f64::from(AXIS_MAX)).round() as u16;
    scaled.clamp(AXIS_MIN, AXIS_MAX)
}

/// Stateful wrapper around [`scale_axis`] holding the optional smoothing FIFO
#[derive(Debug, Clone)]
pub struct AxisMapper {
    config: AxisConfig,
    history: VecDeque<u8>,
}

impl AxisMapper {
    pub fn new(config: AxisConfig) -> Self {
        Self {
            config,
            history: VecDeque::with_capacity(config.smoothing),
        }
    }

    pub fn config(&self) -> &AxisConfig {
        &self.config
    }

    /// Maps a raw reading, clamping it into 0..=255 first
    ///
    /// With smoothing enabled the rounded mean of the last `smoothing`
    /// readings replaces the raw value. Output is deterministic for identical
    /// input and identical buffer contents.
    pub fn map(&mut self, raw: i32) -> u16 {
        let clamped = raw.clamp(0, RAW_MAX) as u8;

        let value = if self.config.smoothing > 0 {
            if self.history.len() == self.config.smoothing {
                self.history.pop_front();
            }
            self.history.push_back(clamped);
            self.smoothed()
        } else {
            clamped
        };

        scale_axis(value, self.config.deadzone, self.config.invert)
    }

    fn smoothed(&self) -> u8 {
        let count = self.history.len() as u32;
        let sum: u32 = self.history.iter().map(|&v| u32::from(v)).sum();
        ((sum + count / 2) / count) as u8
    }
}
