//! Server error types.

use floorsync_core::SessionId;
use thiserror::Error;

/// Registry invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A session with this id was already admitted. The newer session
    /// replaced it.
    #[error("duplicate session id {0}")]
    DuplicateSession(SessionId),
}

/// Why a single outbound enqueue failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The session's queue is at capacity; the message was dropped.
    #[error("outbound queue full")]
    Full,
    /// The session is closing or closed.
    #[error("session closed")]
    Closed,
}

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// `host:port` we tried to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Any other I/O failure on the listener.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
