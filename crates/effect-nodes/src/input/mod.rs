//! Input nodes
//!
//! Nodes that provide constants or live device data.

mod number;
mod sensor_input;

pub use number::{NumberConfig, NumberNode};
pub use sensor_input::{SensorAxis, SensorInputConfig, SensorInputNode};
