//! Output sinks: virtual joystick and key injection

use super::error::{KeyError, SinkError};
use crate::signal::AXIS_CENTER;
use crate::telemetry::{POT_COUNT, SWITCH_COUNT};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Virtual joystick axes in pot order (pot 0 drives `X`, pot 7 drives `Dial`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    RotX,
    RotY,
    RotZ,
    Slider,
    Dial,
}

impl Axis {
    pub const ALL: [Axis; POT_COUNT] = [
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::RotX,
        Axis::RotY,
        Axis::RotZ,
        Axis::Slider,
        Axis::Dial,
    ];

    /// Position in [`Axis::ALL`], which is also the source pot index
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::RotX => "RotX",
            Axis::RotY => "RotY",
            Axis::RotZ => "RotZ",
            Axis::Slider => "Slider",
            Axis::Dial => "Dial",
        };
        write!(f, "{}", name)
    }
}

/// Everything one joystick update carries, applied atomically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoystickState {
    axes: [u16; POT_COUNT],
    /// Button `n` is `buttons[n - 1]`
    pub buttons: [bool; SWITCH_COUNT],
}

impl JoystickState {
    /// All axes centered, all buttons released
    pub fn neutral() -> Self {
        Self {
            axes: [AXIS_CENTER; POT_COUNT],
            buttons: [false; SWITCH_COUNT],
        }
    }

    pub fn axis(&self, axis: Axis) -> u16 {
        self.axes[axis.index()]
    }

    pub fn set_axis(&mut self, axis: Axis, value: u16) {
        self.axes[axis.index()] = value;
    }

    pub fn axes(&self) -> impl Iterator<Item = (Axis, u16)> + '_ {
        Axis::ALL.iter().map(move |&axis| (axis, self.axis(axis)))
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }
}

impl Default for JoystickState {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Virtual joystick output; device discovery and driver access live behind it
pub trait JoystickSink: Send {
    /// Applies all axes and buttons in one update
    fn update(&mut self, state: &JoystickState) -> Result<(), SinkError>;
}

/// Key injection service
pub trait KeySink: Send {
    /// Presses and releases `key`
    fn tap(&mut self, key: &str) -> Result<(), KeyError>;
}

/// Joystick sink that reports updates through tracing
///
/// Stands in for a platform driver; only changes are logged.
#[derive(Debug)]
pub struct TracingJoystickSink {
    device_id: u32,
    last: Option<JoystickState>,
    updates: u64,
}

impl TracingJoystickSink {
    pub fn new(device_id: u32) -> Self {
        info!("Virtual joystick {} ready (tracing output)", device_id);
        Self {
            device_id,
            last: None,
            updates: 0,
        }
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl JoystickSink for TracingJoystickSink {
    fn update(&mut self, state: &JoystickState) -> Result<(), SinkError> {
        self.updates += 1;
        if self.last.as_ref() != Some(state) {
            let axes: Vec<String> = state
                .axes()
                .map(|(axis, value)| format!("{}={}", axis, value))
                .collect();
            debug!(
                "Joystick {}: {} buttons={:?}",
                self.device_id,
                axes.join(" "),
                state.buttons
            );
            self.last = Some(*state);
        }
        Ok(())
    }
}

/// Key sink that reports taps through tracing
#[derive(Debug, Default)]
pub struct TracingKeySink {
    taps: u64,
}

impl TracingKeySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn taps(&self) -> u64 {
        self.taps
    }
}

impl KeySink for TracingKeySink {
    fn tap(&mut self, key: &str) -> Result<(), KeyError> {
        self.taps += 1;
        info!("Key tap: {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_order_matches_pot_order() {
        for (index, axis) in Axis::ALL.iter().enumerate() {
            assert_eq!(axis.index(), index);
        }
        assert_eq!(Axis::Dial.index(), POT_COUNT - 1);
    }

    #[test]
    fn neutral_state_is_centered_and_released() {
        let state = JoystickState::neutral();
        assert!(state.axes().all(|(_, value)| value == AXIS_CENTER));
        assert_eq!(state.buttons, [false; SWITCH_COUNT]);
        assert!(state.is_neutral());
    }

    #[test]
    fn set_axis_only_touches_one_axis() {
        let mut state = JoystickState::neutral();
        state.set_axis(Axis::Slider, 1);

        assert_eq!(state.axis(Axis::Slider), 1);
        assert_eq!(state.axis(Axis::Dial), AXIS_CENTER);
        assert!(!state.is_neutral());
    }

    #[test]
    fn tracing_sinks_count_calls() {
        let mut joystick = TracingJoystickSink::new(1);
        joystick.update(&JoystickState::neutral()).unwrap();
        joystick.update(&JoystickState::neutral()).unwrap();
        assert_eq!(joystick.updates(), 2);

        let mut keys = TracingKeySink::new();
        keys.tap("g").unwrap();
        assert_eq!(keys.taps(), 1);
    }
}
