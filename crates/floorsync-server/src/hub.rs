//! The hub: registry, presence and relay behind one handle.
//!
//! A single `Arc<Hub>` is shared by the axum state and every connection
//! task.

use std::sync::Arc;

use floorsync_core::{
    ApplicationMessage, Identity, MessageKind, PresenceSnapshot, ProtocolError, SessionId,
};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::metrics::HUB_EVICTIONS_TOTAL;
use crate::websocket::presence::{PresencePublisher, PublishReport};
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::relay::{MessageRelay, RelayOutcome};
use crate::websocket::session::Session;

/// What the hub did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// A `USER_CONNECT` was applied and presence re-published.
    Announced(Identity),
    /// The frame was relayed verbatim.
    Relayed(RelayOutcome),
}

/// Shared hub state.
pub struct Hub {
    config: HubConfig,
    registry: ConnectionRegistry,
    presence: PresencePublisher,
    relay: MessageRelay,
}

impl Hub {
    /// Create a hub.
    pub fn new(config: HubConfig) -> Self {
        let max_dropped = config.max_dropped_messages;
        Self {
            config,
            registry: ConnectionRegistry::new(),
            presence: PresencePublisher::new(max_dropped),
            relay: MessageRelay::new(max_dropped),
        }
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Whether admitting another session would exceed `max_connections`.
    pub fn at_capacity(&self) -> bool {
        self.registry.len() >= self.config.max_connections
    }

    /// Create and admit a session, then publish presence.
    ///
    /// The returned receiver is the session's outbound queue; it already
    /// holds the first presence snapshot.
    pub fn open_session(&self) -> (Arc<Session>, mpsc::Receiver<Arc<String>>) {
        let (session, rx) = Session::channel(self.config.outbound_queue_capacity);
        if let Err(e) = self.registry.admit(Arc::clone(&session)) {
            warn!(error = %e, "admission replaced an existing session");
        }
        info!(session_id = %session.id(), total = self.registry.len(), "session opened");
        let _ = self.publish_presence();
        (session, rx)
    }

    /// Remove a session. Presence is re-published only if it was present.
    pub fn close_session(&self, id: &SessionId) -> bool {
        if self.registry.remove(id).is_some() {
            info!(session_id = %id, total = self.registry.len(), "session closed");
            let _ = self.publish_presence();
            true
        } else {
            false
        }
    }

    /// Handle one inbound text frame from `origin`.
    ///
    /// `USER_CONNECT` binds the sender's identity; `CONNECTED_USERS` is
    /// rejected; everything else is relayed byte-for-byte.
    pub fn handle_inbound(
        &self,
        origin: &SessionId,
        text: &str,
    ) -> Result<InboundOutcome, ProtocolError> {
        let message = ApplicationMessage::parse(text)?;
        match message.kind {
            MessageKind::UserConnect => {
                let identity = Identity::from_payload(&message.payload)?;
                if self.registry.set_identity(origin, identity.clone()) {
                    info!(session_id = %origin, name = %identity.display_name, "identity announced");
                    let _ = self.publish_presence();
                } else {
                    debug!(session_id = %origin, "announcement from a session no longer admitted");
                }
                Ok(InboundOutcome::Announced(identity))
            }
            MessageKind::ConnectedUsers => Err(ProtocolError::ServerOnly(
                MessageKind::ConnectedUsers.to_string(),
            )),
            kind => Ok(InboundOutcome::Relayed(self.relay_frame(
                Some(origin),
                &kind,
                &Arc::new(text.to_owned()),
            ))),
        }
    }

    /// Relay an event pushed by the CRUD layer.
    ///
    /// Hub-internal kinds are rejected.
    pub fn publish_event(&self, message: &ApplicationMessage) -> Result<RelayOutcome, ProtocolError> {
        if message.kind.is_hub_internal() {
            return Err(ProtocolError::ServerOnly(message.kind.to_string()));
        }
        let frame = Arc::new(message.encode()?);
        Ok(self.relay_frame(None, &message.kind, &frame))
    }

    /// Relay a serialized frame, then evict failed recipients.
    pub fn relay_frame(
        &self,
        origin: Option<&SessionId>,
        kind: &MessageKind,
        frame: &Arc<String>,
    ) -> RelayOutcome {
        let outcome = self.relay.relay(&self.registry, origin, kind, frame);
        let _ = self.evict(&outcome.evictable);
        outcome
    }

    /// Remove sessions that can no longer receive and publish presence once
    /// if any were removed.
    pub fn evict(&self, ids: &[SessionId]) -> usize {
        let removed = ids
            .iter()
            .filter(|id| self.registry.remove(id).is_some())
            .inspect(|id| {
                info!(session_id = %id, "evicting session after failed delivery");
                counter!(HUB_EVICTIONS_TOTAL).increment(1);
            })
            .count();
        if removed > 0 {
            let _ = self.publish_presence();
        }
        removed
    }

    /// Broadcast the current presence snapshot.
    pub fn publish_presence(&self) -> PublishReport {
        self.presence.publish(&self.registry)
    }

    /// Current presence snapshot.
    pub fn presence_snapshot(&self) -> PresenceSnapshot {
        self.presence.snapshot(&self.registry)
    }
}
