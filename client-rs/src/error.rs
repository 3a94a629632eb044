//! Error types for the live client

use thiserror::Error;

/// Failures reported by a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// An established connection went away
    #[error("Connection closed: {0}")]
    Closed(String),

    /// The peer refused a frame or subscription
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The transport is not (or no longer) connected
    #[error("Transport not connected")]
    NotConnected,
}

/// Errors surfaced by a [`Session`](crate::Session)
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session has no live connection
    #[error("Not connected")]
    NotConnected,

    /// Every retry failed
    #[error("Connection failed after multiple attempts")]
    ReconnectExhausted { attempts: u32 },

    /// Failed to encode an outgoing message
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport refused the operation
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
