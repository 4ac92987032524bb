//! `HubClient`: one background task per client that owns the socket,
//! announces the identity, routes inbound frames and reconnects.

use std::sync::Arc;
use std::time::Duration;

use floorsync_core::{ApplicationMessage, MessageKind, PresenceSnapshot};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::errors::{ClientError, Result};
use crate::state::{ConnectionStatus, PhaseEvent, SyncPhase, Transition};
use crate::subscriptions::{Subscription, SubscriptionTable};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// How long a clean close may take before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared between the handle and the connection task.
struct Shared {
    status: watch::Sender<ConnectionStatus>,
    phase: watch::Sender<SyncPhase>,
    presence: watch::Sender<PresenceSnapshot>,
    subscriptions: SubscriptionTable,
    /// Present only while a socket is open.
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl Shared {
    fn new(subscription_capacity: usize) -> Self {
        Self {
            status: watch::channel(ConnectionStatus::Connecting).0,
            phase: watch::channel(SyncPhase::Disconnected).0,
            presence: watch::channel(PresenceSnapshot::default()).0,
            subscriptions: SubscriptionTable::new(subscription_capacity),
            outbound: Mutex::new(None),
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!(from = %previous, to = %status, "status changed");
        }
    }

    /// Only the connection task calls this, so read-then-replace is safe.
    fn apply(&self, event: PhaseEvent) -> Transition {
        let current = *self.phase.borrow();
        let transition = current.on(event);
        if transition.phase != current {
            let _ = self.phase.send_replace(transition.phase);
        }
        transition
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    /// Transport failure or hub close; reconnect.
    Lost,
    /// [`HubClient::close`] was called.
    Stopped,
}

/// Handle to a hub connection.
///
/// Created with [`HubClient::connect`], which must be called inside a tokio
/// runtime. Dropping the handle stops the background task.
pub struct HubClient {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HubClient {
    /// Spawn the connection loop and return immediately.
    ///
    /// The status starts as [`ConnectionStatus::Connecting`]; use
    /// [`watch_status`](Self::watch_status) or
    /// [`watch_phase`](Self::watch_phase) to wait for the socket.
    pub fn connect(config: ClientConfig) -> Self {
        let shared = Arc::new(Shared::new(config.subscription_capacity));
        let cancel = CancellationToken::new();
        let span = info_span!(
            "hub_client",
            url = %config.url,
            name = %config.identity.display_name
        );
        let task = tokio::spawn(
            run_loop(Arc::clone(&shared), config, cancel.clone()).instrument(span),
        );
        Self {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Current channel status.
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Current sync phase.
    pub fn phase(&self) -> SyncPhase {
        *self.shared.phase.borrow()
    }

    /// Receiver notified on every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
        self.shared.phase.subscribe()
    }

    /// Latest presence snapshot received from the hub.
    ///
    /// Empty until the first `CONNECTED_USERS` frame arrives. Kept across
    /// reconnects until the new connection delivers a fresh one.
    pub fn presence(&self) -> PresenceSnapshot {
        self.shared.presence.borrow().clone()
    }

    /// Receiver notified on every presence snapshot.
    pub fn watch_presence(&self) -> watch::Receiver<PresenceSnapshot> {
        self.shared.presence.subscribe()
    }

    /// Messages of one kind. `CONNECTED_USERS` is allowed and receives every
    /// presence frame.
    pub fn subscribe(&self, kind: impl Into<MessageKind>) -> Subscription {
        self.shared.subscriptions.subscribe(kind)
    }

    /// Every inbound message.
    pub fn subscribe_all(&self) -> Subscription {
        self.shared.subscriptions.subscribe_all()
    }

    /// Inbound messages matching `predicate`.
    pub fn subscribe_where<F>(&self, predicate: F) -> Subscription
    where
        F: Fn(&ApplicationMessage) -> bool + Send + Sync + 'static,
    {
        self.shared.subscriptions.subscribe_where(predicate)
    }

    /// Queue a message on the current connection.
    ///
    /// Fails immediately with [`ClientError::NotOpen`] while no socket is
    /// open. Messages are never replayed after a reconnect.
    pub fn send(&self, message: &ApplicationMessage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::NotOpen);
        }
        let tx = self
            .shared
            .outbound
            .lock()
            .clone()
            .ok_or(ClientError::NotOpen)?;
        let text = message.encode()?;
        tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::NotOpen,
        })
    }

    /// Stop the connection loop and wait for it to exit.
    ///
    /// Sends a close frame if a socket is open. The status is
    /// [`ConnectionStatus::Closed`] afterwards.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "hub client task failed");
            }
        }
        self.shared.set_status(ConnectionStatus::Closed);
    }
}

impl Drop for HubClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("status", &self.status())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Dial, serve, back off, repeat until cancelled.
async fn run_loop(shared: Arc<Shared>, config: ClientConfig, cancel: CancellationToken) {
    let mut backoff = Backoff::new(config.initial_backoff, config.max_backoff, config.jitter);

    loop {
        let _ = shared.apply(PhaseEvent::DialStarted);
        shared.set_status(ConnectionStatus::Connecting);
        debug!(attempt = backoff.attempt(), "connecting to hub");

        let dialed = tokio::select! {
            () = cancel.cancelled() => break,
            result = connect_async(config.url.as_str()) => result,
        };

        match dialed {
            Ok((ws, _response)) => {
                backoff.reset();
                info!("connected to hub");
                if run_connection(&shared, &config, ws, &cancel).await == ConnectionEnd::Stopped {
                    break;
                }
                warn!("connection to hub lost");
            }
            Err(e) => warn!(error = %e, "failed to connect to hub"),
        }

        let _ = shared.apply(PhaseEvent::SocketLost);
        shared.set_status(ConnectionStatus::Error);

        let delay = backoff.next_delay();
        info!(
            delay_ms = delay.as_millis(),
            attempt = backoff.attempt(),
            "reconnecting after backoff"
        );
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    let _ = shared.outbound.lock().take();
    let _ = shared.apply(PhaseEvent::SocketLost);
    shared.set_status(ConnectionStatus::Closed);
    info!("hub client stopped");
}

/// Serve one physical connection until it drops or the client closes.
async fn run_connection(
    shared: &Shared,
    config: &ClientConfig,
    ws: WsStream,
    cancel: &CancellationToken,
) -> ConnectionEnd {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut outbound) = mpsc::channel::<String>(config.outbound_capacity.max(1));

    // Anything queued now is drained after the announcement below.
    *shared.outbound.lock() = Some(tx);
    shared.set_status(ConnectionStatus::Open);

    let transition = shared.apply(PhaseEvent::SocketOpened);
    if transition.announce && !announce(&mut sink, config).await {
        let _ = shared.outbound.lock().take();
        return ConnectionEnd::Lost;
    }

    let end = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                break ConnectionEnd::Stopped;
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!(error = %e, "write to hub failed");
                    break ConnectionEnd::Lost;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(shared, text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => handle_frame(shared, text),
                    Err(_) => debug!(len = data.len(), "dropping non-UTF8 binary frame"),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        warn!(error = %e, "failed to answer ping");
                        break ConnectionEnd::Lost;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "hub closed the connection");
                    break ConnectionEnd::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "read from hub failed");
                    break ConnectionEnd::Lost;
                }
                None => break ConnectionEnd::Lost,
            },
        }
    };

    let _ = shared.outbound.lock().take();
    end
}

/// Send the `USER_CONNECT` frame. Returns `false` if the socket failed.
async fn announce(sink: &mut WsSink, config: &ClientConfig) -> bool {
    let text = match ApplicationMessage::identity_announcement(&config.identity).encode() {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to encode identity announcement");
            return true;
        }
    };
    match sink.send(Message::text(text)).await {
        Ok(()) => {
            debug!("identity announced");
            true
        }
        Err(e) => {
            warn!(error = %e, "failed to announce identity");
            false
        }
    }
}

/// Route one inbound text frame: presence updates state, everything
/// (presence included) goes to matching subscribers.
fn handle_frame(shared: &Shared, text: &str) {
    let message = match ApplicationMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "dropping malformed frame from hub");
            return;
        }
    };

    if message.kind == MessageKind::ConnectedUsers {
        let snapshot = match PresenceSnapshot::from_payload(&message.payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "dropping malformed presence snapshot");
                return;
            }
        };
        debug!(
            count = snapshot.count,
            announced = snapshot.entries.len(),
            "presence updated"
        );
        let _ = shared.presence.send_replace(snapshot);

        let before = *shared.phase.borrow();
        let transition = shared.apply(PhaseEvent::PresenceReceived);
        if before == SyncPhase::Announcing && transition.phase == SyncPhase::Synced {
            info!("synced with hub");
        }
    }

    let _ = shared.subscriptions.dispatch(&message);
}
