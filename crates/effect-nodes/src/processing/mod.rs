//! Processing nodes
//!
//! Pure numeric transforms.

mod clamp;
mod lfo;
mod math;
mod threshold;

pub use clamp::{ClampConfig, ClampNode};
pub use lfo::{LfoConfig, LfoNode, Waveform};
pub use math::{MathConfig, MathNode, MathOperation};
pub use threshold::{ThresholdConfig, ThresholdNode};
