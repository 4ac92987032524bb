//! Subscription table: routes inbound messages to subscribers by kind,
//! wildcard, or predicate.

use std::collections::HashMap;
use std::sync::Arc;

use floorsync_core::{ApplicationMessage, MessageKind};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Filter for [`SubscriptionTable::subscribe_where`].
pub type Predicate = Arc<dyn Fn(&ApplicationMessage) -> bool + Send + Sync>;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<ApplicationMessage>,
}

impl Subscriber {
    /// Returns `false` once the receiving [`Subscription`] is gone.
    fn deliver(&self, message: &ApplicationMessage) -> bool {
        match self.tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = self.id, kind = %message.kind, "subscription full, dropping message");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    by_kind: HashMap<MessageKind, Vec<Subscriber>>,
    wildcard: Vec<Subscriber>,
    predicates: Vec<(Subscriber, Predicate)>,
}

impl Inner {
    fn subscriber(&mut self, capacity: usize) -> (Subscriber, Subscription) {
        self.next_id += 1;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id;
        (Subscriber { id, tx }, Subscription { id, rx })
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<ApplicationMessage>,
}

impl Subscription {
    /// Table-assigned id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next matching message. `None` once the table is dropped.
    pub async fn recv(&mut self) -> Option<ApplicationMessage> {
        self.rx.recv().await
    }

    /// Next message if one is already buffered.
    pub fn try_recv(&mut self) -> Option<ApplicationMessage> {
        self.rx.try_recv().ok()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Subscribers keyed by message kind, plus wildcard and predicate lists.
///
/// Each subscription has its own bounded buffer; a full buffer drops the new
/// message for that subscriber only. Subscribers whose [`Subscription`] was
/// dropped are pruned on the next dispatch.
pub struct SubscriptionTable {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl SubscriptionTable {
    /// Table whose subscriptions buffer up to `capacity` messages each.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Messages of one kind.
    pub fn subscribe(&self, kind: impl Into<MessageKind>) -> Subscription {
        let mut inner = self.inner.lock();
        let (subscriber, subscription) = inner.subscriber(self.capacity);
        inner.by_kind.entry(kind.into()).or_default().push(subscriber);
        subscription
    }

    /// Every message.
    pub fn subscribe_all(&self) -> Subscription {
        let mut inner = self.inner.lock();
        let (subscriber, subscription) = inner.subscriber(self.capacity);
        inner.wildcard.push(subscriber);
        subscription
    }

    /// Messages for which `predicate` returns `true`.
    pub fn subscribe_where<F>(&self, predicate: F) -> Subscription
    where
        F: Fn(&ApplicationMessage) -> bool + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let (subscriber, subscription) = inner.subscriber(self.capacity);
        inner.predicates.push((subscriber, Arc::new(predicate)));
        subscription
    }

    /// Deliver `message` to every matching subscriber.
    ///
    /// Returns how many subscribers matched.
    pub fn dispatch(&self, message: &ApplicationMessage) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut matched = 0;

        if let Some(list) = inner.by_kind.get_mut(&message.kind) {
            matched += list.len();
            list.retain(|s| s.deliver(message));
            if list.is_empty() {
                let _ = inner.by_kind.remove(&message.kind);
            }
        }

        matched += inner.wildcard.len();
        inner.wildcard.retain(|s| s.deliver(message));

        inner.predicates.retain(|(s, predicate)| {
            if s.tx.is_closed() {
                return false;
            }
            if !predicate(message) {
                return true;
            }
            matched += 1;
            s.deliver(message)
        });

        debug!(kind = %message.kind, matched, "dispatched inbound message");
        matched
    }

    /// Live subscriber count, across all lists.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.by_kind.values().map(Vec::len).sum::<usize>()
            + inner.wildcard.len()
            + inner.predicates.len()
    }

    /// Whether there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SUBSCRIPTION_CAPACITY)
    }
}
