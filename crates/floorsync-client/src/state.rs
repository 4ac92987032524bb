//! Connection status and the reconnect state machine.

use std::fmt;

/// Channel status as seen by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Dialing the hub.
    Connecting,
    /// Socket open; `send` is accepted.
    Open,
    /// Closed by [`HubClient::close`](crate::HubClient::close). Terminal.
    Closed,
    /// The last attempt failed or the connection dropped; a reconnect is
    /// scheduled.
    Error,
}

impl ConnectionStatus {
    /// Lowercase label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the client is in establishing a synchronized view of the hub.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// No socket.
    #[default]
    Disconnected,
    /// Dial in progress.
    Connecting,
    /// Socket open and identity sent; waiting for a presence snapshot.
    Announcing,
    /// Presence received after announcing.
    Synced,
}

/// Inputs to [`SyncPhase::on`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseEvent {
    /// A connection attempt started.
    DialStarted,
    /// The WebSocket handshake completed.
    SocketOpened,
    /// A `CONNECTED_USERS` frame arrived.
    PresenceReceived,
    /// The socket closed or the dial failed.
    SocketLost,
}

/// Result of applying a [`PhaseEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Phase after the event.
    pub phase: SyncPhase,
    /// Send the identity announcement now.
    pub announce: bool,
}

impl SyncPhase {
    /// Apply an event.
    ///
    /// Only `Connecting + SocketOpened` asks for an announcement, so the
    /// identity goes out exactly once per physical connection. Events that
    /// make no sense in the current phase leave it unchanged.
    pub fn on(self, event: PhaseEvent) -> Transition {
        let (phase, announce) = match (self, event) {
            (_, PhaseEvent::SocketLost) => (Self::Disconnected, false),
            (Self::Disconnected, PhaseEvent::DialStarted) => (Self::Connecting, false),
            (Self::Connecting, PhaseEvent::SocketOpened) => (Self::Announcing, true),
            (Self::Announcing | Self::Synced, PhaseEvent::PresenceReceived) => {
                (Self::Synced, false)
            }
            (phase, _) => (phase, false),
        };
        Transition { phase, announce }
    }

    /// Whether a socket is currently open in this phase.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Announcing | Self::Synced)
    }
}
