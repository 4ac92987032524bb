//! Client error types.

use thiserror::Error;

/// Errors surfaced by [`HubClient`](crate::HubClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The channel to the hub is not open, either between reconnects or
    /// after [`HubClient::close`](crate::HubClient::close). Nothing was queued.
    #[error("not connected to the hub")]
    NotOpen,
    /// The outbound queue for the current connection is full.
    #[error("outbound queue full")]
    QueueFull,
    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(ClientError::NotOpen.to_string(), "not connected to the hub");
        assert_eq!(ClientError::QueueFull.to_string(), "outbound queue full");
    }

    #[test]
    fn encode_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ClientError::from(json_err);
        assert!(err.to_string().starts_with("failed to encode message"));
    }
}
