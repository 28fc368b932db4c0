//! Signal conditioning for pots and switches
//!
//! - [`axis_mapper`] - calibrated 1..=32767 axis values from raw 0..=255 pots
//! - [`switch_filter`] - debounced, hysteresis-stable booleans from noisy switch lines
//!
//! Both are owned by the bridge worker and never shared between threads.

pub mod axis_mapper;
pub mod switch_filter;

pub use axis_mapper::{scale_axis, AxisConfig, AxisMapper, AXIS_CENTER, AXIS_MAX, AXIS_MIN};
pub use switch_filter::{SwitchFilter, SwitchFilterSettings};
