//! Error types for the node engine

use thiserror::Error;

use crate::events::EffectError;
use crate::validation::GraphIssue;

/// Result type alias using NodeEngineError
pub type Result<T> = std::result::Result<T, NodeEngineError>;

/// Errors that can occur in the node engine
#[derive(Debug, Error)]
pub enum NodeEngineError {
    /// No definition registered for a node type
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// A referenced node does not exist in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A referenced group does not exist
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// A node definition is internally inconsistent
    #[error("Invalid node definition '{node_type}': {message}")]
    InvalidDefinition { node_type: String, message: String },

    /// A config value failed its schema
    #[error("Invalid config key '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    /// A structural edit was rejected
    #[error("Change rejected: {0}")]
    Rejected(GraphIssue),

    /// A node's process or sink hook failed
    #[error("Node execution failed: {0}")]
    ExecutionFailed(String),

    /// An effect could not be handed to its sink
    #[error("Effect delivery failed: {0}")]
    EffectDelivery(String),

    /// Snapshot file is not a node graph or has an unsupported version
    #[error("Unsupported snapshot: {0}")]
    UnsupportedSnapshot(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),
}

impl From<EffectError> for NodeEngineError {
    fn from(err: EffectError) -> Self {
        Self::EffectDelivery(err.message)
    }
}

impl NodeEngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }
}
