//! Error types for envelope parsing and validation

use thiserror::Error;

/// Result type alias using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding or validating protocol traffic
///
/// These never cross the wire: the routing boundary logs them and drops the
/// offending message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Text was not valid JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// JSON was not an object with a string `type`
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// `type` is not one of the known message kinds
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// `version` did not match the protocol version
    #[error("Protocol version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: String },

    /// Payload failed edge validation
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Wire frame could not be decoded
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

impl ProtocolError {
    /// Create an invalid payload error with a message
    pub fn payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }
}
