//! Error types for the node executor

use node_engine::{GraphIssue, NodeEngineError};
use tandem_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias using ExecutorError
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Errors raised by the deploy protocol and the client-side host
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Plugin message addressed to another plugin
    #[error("Not a node executor message (pluginId '{0}')")]
    WrongPlugin(String),

    /// Plugin command name is not one of deploy/start/stop/remove
    #[error("Unknown executor command: {0}")]
    UnknownCommand(String),

    /// No installed loop with this id
    #[error("Loop not found: {0}")]
    LoopNotFound(String),

    /// Deployed graph failed validation
    #[error("Loop '{loop_id}' rejected: {}", join_issues(.issues))]
    InvalidGraph { loop_id: String, issues: Vec<GraphIssue> },

    /// The link to the server could not carry a message
    #[error("Transport error: {0}")]
    Transport(String),

    /// Graph engine error
    #[error("Engine error: {0}")]
    Engine(#[from] NodeEngineError),

    /// Envelope error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExecutorError {
    /// Create a transport error with a message
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

fn join_issues(issues: &[GraphIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
