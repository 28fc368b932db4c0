//! Serial potentiometer/switch telemetry to virtual joystick bridge
//!
//! A microcontroller streams eight pot readings and two switch states over a
//! serial link. The bridge decodes the stream, conditions every channel and
//! drives a virtual joystick plus key taps on switch edges.

pub mod bridge;
pub mod config;
pub mod signal;
pub mod telemetry;
