//! Error types for the Lyngdorf client

use thiserror::Error;

/// Errors surfaced by the connection manager, transport and device facade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LyngdorfError {
    /// The socket could not be established (refused, timed out, OS error).
    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionError {
        host: String,
        port: u16,
        reason: String,
    },

    /// The link is down; pending and new calls fail until a reconnect succeeds.
    #[error("Device unavailable")]
    DeviceUnavailable,

    #[error("No reply to {command} within {timeout_ms}ms")]
    CommandTimeout { command: String, timeout_ms: u64 },

    /// An inbound line that does not fit the protocol grammar.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, LyngdorfError>;
