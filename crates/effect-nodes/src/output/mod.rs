//! Output nodes
//!
//! Sink leaves that deliver commands.

mod client_object;
mod log_node;

pub use client_object::{ClientObjectConfig, ClientObjectNode};
pub use log_node::{LogConfig, LogNode};
