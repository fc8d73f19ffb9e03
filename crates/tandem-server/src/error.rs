//! Error types for the server

use tandem_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias using ServerError
pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid handshake: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The hub task has stopped
    #[error("Dispatch queue closed")]
    HubClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }
}

/// Failure to hand a frame to one socket
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Unknown socket: {0}")]
    UnknownSocket(String),

    #[error("Socket closed: {0}")]
    Closed(String),

    #[error("Frame encoding failed: {0}")]
    Encoding(String),
}
