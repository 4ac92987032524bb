//! One admitted client connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use floorsync_core::{Identity, SessionId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::errors::DeliveryError;

/// Lifecycle of a hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade in progress; not yet admitted.
    Connecting,
    /// Admitted and exchanging frames.
    Open,
    /// Shutdown initiated by either side.
    Closing,
    /// Terminal.
    Closed,
}

/// A connected client as seen by the hub.
///
/// The outbound queue is drained by the connection's writer task, the only
/// writer to the socket. Closing the session cancels its token: the writer
/// and heartbeat stop and later sends fail with [`DeliveryError::Closed`].
pub struct Session {
    id: SessionId,
    connected_at: DateTime<Utc>,
    identity: Mutex<Option<Identity>>,
    state: Mutex<ConnectionState>,
    tx: mpsc::Sender<Arc<String>>,
    cancel: CancellationToken,
    /// Whether the peer has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl Session {
    /// Create a session with a fresh id around an existing queue sender.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self::with_id(SessionId::new(), tx)
    }

    /// Create a session with a specific id.
    pub fn with_id(id: SessionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            identity: Mutex::new(None),
            state: Mutex::new(ConnectionState::Connecting),
            tx,
            cancel: CancellationToken::new(),
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(Instant::now()),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a session together with its bounded outbound queue.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(tx)), rx)
    }

    /// Session id, stable for the connection's lifetime.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Admission time.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Announced identity, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.lock().clone()
    }

    /// Whether the client has announced itself.
    pub fn is_announced(&self) -> bool {
        self.identity.lock().is_some()
    }

    /// Last write wins. Only the registry calls this.
    pub(crate) fn set_identity(&self, identity: Identity) {
        *self.identity.lock() = Some(identity);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next`. `Closed` is terminal and a closing session never
    /// reopens.
    pub(crate) fn transition(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        let allowed = match (*state, next) {
            (ConnectionState::Closed, _) => false,
            (ConnectionState::Closing, ConnectionState::Connecting | ConnectionState::Open) => {
                false
            }
            _ => true,
        };
        if allowed {
            *state = next;
        }
    }

    /// Enqueue a serialized frame without waiting.
    ///
    /// A full queue drops the new frame and counts the drop.
    pub fn send(&self, frame: Arc<String>) -> Result<(), DeliveryError> {
        if self.cancel.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(DeliveryError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Lifetime count of frames dropped on a full queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether the hub should stop delivering to this session.
    pub fn should_evict(&self, max_dropped: u64) -> bool {
        self.is_closed() || self.drop_count() >= max_dropped
    }

    /// Begin closing: cancels the token so the writer and heartbeat exit.
    pub fn close(&self) {
        self.transition(ConnectionState::Closing);
        self.cancel.cancel();
    }

    /// Whether the session was closed or its queue receiver is gone.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Token cancelled when the session closes.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Read and reset the alive flag.
    ///
    /// Returns `true` if the peer was active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("identity", &*self.identity.lock())
            .field("state", &self.state())
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
