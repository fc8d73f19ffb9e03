//! Effect Nodes
//!
//! Built-in node implementations for tandem effect graphs. Each node is a
//! small building block that can be composed into a loop driving one client.
//!
//! # Categories
//!
//! - **Input**: constants and live sensor samples
//! - **Processing**: pure numeric transforms (math, LFO, clamp, threshold)
//! - **Effect**: nodes that turn values into device commands
//! - **Output**: sink leaves that deliver commands (client anchor, log)

pub mod effect;
pub mod input;
pub mod output;
mod ports;
pub mod processing;
pub mod setup;

// Re-export all nodes for convenience
pub use effect::*;
pub use input::*;
pub use output::*;
pub use processing::*;
pub use setup::{builtin_registry, register_builtin_nodes, BuiltinNode};
