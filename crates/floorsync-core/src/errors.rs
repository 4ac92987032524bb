//! Protocol error types.

use thiserror::Error;

/// Why an inbound frame was rejected.
///
/// Protocol errors never close a connection: the offending frame is logged
/// and dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a JSON object of the shape `{type, payload}`.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A `USER_CONNECT` payload did not carry a usable identity.
    #[error("invalid identity announcement: {0}")]
    InvalidIdentity(String),
    /// A client sent a kind that only the hub may emit.
    #[error("message type {0} is server-to-client only")]
    ServerOnly(String),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
