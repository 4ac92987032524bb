//! Application message relay.
//!
//! Every relayed frame goes to every admitted session, the sender included.
//! Nothing is deduplicated or persisted.

use std::sync::Arc;

use floorsync_core::{MessageKind, SessionId};
use metrics::counter;
use tracing::debug;

use super::broadcast::fan_out;
use super::registry::ConnectionRegistry;
use crate::metrics::HUB_RELAYED_MESSAGES_TOTAL;

/// What relaying one frame did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Sessions in the snapshot the frame was sent to.
    pub recipients: usize,
    /// Successful enqueues.
    pub delivered: usize,
    /// Frames dropped on full queues.
    pub dropped: usize,
    /// Sessions that should be evicted after this relay.
    pub evictable: Vec<SessionId>,
}

/// Forwards application frames to every session.
pub struct MessageRelay {
    max_dropped: u64,
}

impl MessageRelay {
    /// Create a relay. Recipients at `max_dropped` lifetime drops are
    /// reported as evictable.
    pub fn new(max_dropped: u64) -> Self {
        Self {
            max_dropped: max_dropped.max(1),
        }
    }

    /// Send `frame` to every session in a fresh registry snapshot.
    ///
    /// `origin` is `None` for events pushed over HTTP. Zero recipients is
    /// not an error.
    pub fn relay(
        &self,
        registry: &ConnectionRegistry,
        origin: Option<&SessionId>,
        kind: &MessageKind,
        frame: &Arc<String>,
    ) -> RelayOutcome {
        if !kind.is_known() {
            debug!(%kind, "relaying unrecognized message type");
        }

        let sessions = registry.list();
        let outcome = fan_out(&sessions, frame);
        // Unknown kinds share one label value to bound cardinality.
        let label = if kind.is_known() { kind.as_str() } else { "unknown" };
        counter!(HUB_RELAYED_MESSAGES_TOTAL, "kind" => label.to_owned()).increment(1);
        debug!(
            %kind,
            origin = origin.map_or("http", SessionId::as_str),
            recipients = outcome.recipients,
            delivered = outcome.delivered,
            "relayed message"
        );

        RelayOutcome {
            recipients: outcome.recipients,
            delivered: outcome.delivered,
            dropped: outcome.dropped(),
            evictable: outcome
                .evictable(self.max_dropped)
                .iter()
                .map(|s| s.id().clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::session::Session;
    use tokio::sync::mpsc;

    fn admitted(registry: &ConnectionRegistry, capacity: usize) -> (Arc<Session>, mpsc::Receiver<Arc<String>>) {
        let (session, rx) = Session::channel(capacity);
        registry.admit(session.clone()).unwrap();
        (session, rx)
    }

    #[test]
    fn sender_receives_its_own_frame() {
        let registry = ConnectionRegistry::new();
        let (sender, mut own_rx) = admitted(&registry, 4);
        let (_other, mut other_rx) = admitted(&registry, 4);
        let frame = Arc::new(r#"{"type":"NEW_ORDER","payload":{"tableId":7}}"#.to_string());

        let outcome =
            MessageRelay::new(10).relay(&registry, Some(sender.id()), &MessageKind::NewOrder, &frame);

        assert_eq!(outcome.recipients, 2);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(*own_rx.try_recv().unwrap(), *frame);
        assert_eq!(*other_rx.try_recv().unwrap(), *frame);
    }

    #[test]
    fn unknown_kinds_are_relayed() {
        let registry = ConnectionRegistry::new();
        let (_s, mut rx) = admitted(&registry, 4);
        let frame = Arc::new(r#"{"type":"KITCHEN_PING","payload":null}"#.to_string());
        let kind = MessageKind::from("KITCHEN_PING");

        let outcome = MessageRelay::new(10).relay(&registry, None, &kind, &frame);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(&*rx.try_recv().unwrap(), &*frame);
    }

    #[test]
    fn zero_recipients_is_fine() {
        let registry = ConnectionRegistry::new();
        let outcome = MessageRelay::new(10).relay(
            &registry,
            None,
            &MessageKind::MenuUpdated,
            &Arc::new("{}".to_string()),
        );
        assert_eq!(outcome, RelayOutcome::default());
    }

    #[test]
    fn closed_recipient_reported_not_fatal() {
        let registry = ConnectionRegistry::new();
        let (_a, mut ra) = admitted(&registry, 4);
        let (b, rb) = admitted(&registry, 4);
        drop(rb);

        let outcome = MessageRelay::new(10).relay(
            &registry,
            None,
            &MessageKind::OrderUpdated,
            &Arc::new("{}".to_string()),
        );
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.evictable, vec![b.id().clone()]);
        assert!(ra.try_recv().is_ok());
        // relay reports, the hub evicts
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn full_recipient_counts_drop() {
        let registry = ConnectionRegistry::new();
        let (_a, _ra) = admitted(&registry, 1);
        let relay = MessageRelay::new(5);
        let frame = Arc::new("{}".to_string());
        let _ = relay.relay(&registry, None, &MessageKind::NewOrder, &frame);
        let outcome = relay.relay(&registry, None, &MessageKind::NewOrder, &frame);
        assert_eq!(outcome.dropped, 1);
        assert!(outcome.evictable.is_empty());
    }
}
