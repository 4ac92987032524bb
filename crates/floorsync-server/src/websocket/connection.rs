//! WebSocket connection task: drives one admitted session from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use floorsync_core::ProtocolError;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, instrument, warn};

use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::session::{ConnectionState, Session};
use crate::hub::{Hub, InboundOutcome};
use crate::metrics::{
    HUB_PROTOCOL_ERRORS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

type WsSink = SplitSink<WebSocket, Message>;

/// Upper bound on the close handshake once a session has ended.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why the read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    PeerClosed,
    Transport,
    SessionClosed,
    Shutdown,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::Transport => "transport_error",
            Self::SessionClosed => "session_closed",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Run an admitted session over its socket.
///
/// 1. Marks the session `Open` and spawns the writer (sole socket writer,
///    also sends pings) and the heartbeat watcher
/// 2. Feeds inbound text frames to the hub; protocol errors are logged and
///    the connection stays open
/// 3. Stops on peer close, transport error, session close (eviction, write
///    timeout, heartbeat timeout) or server shutdown
/// 4. Removes the session from the hub, which re-publishes presence, then
///    waits for the writer and heartbeat tasks to wind down
#[instrument(skip_all, fields(session_id = %session.id()))]
pub async fn run_ws_session(
    ws: WebSocket,
    hub: Arc<Hub>,
    session: Arc<Session>,
    outbound: mpsc::Receiver<Arc<String>>,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let started = Instant::now();
    session.transition(ConnectionState::Open);
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let config = hub.config();
    let writer = tokio::spawn(
        run_writer(
            ws_tx,
            outbound,
            Arc::clone(&session),
            config.send_timeout(),
            config.heartbeat_interval(),
        )
        .instrument(Span::current()),
    );
    let heartbeat = tokio::spawn(
        watch_heartbeat(
            Arc::clone(&session),
            config.heartbeat_interval(),
            config.heartbeat_timeout(),
        )
        .instrument(Span::current()),
    );

    let closed = session.cancel_token();
    let reason = loop {
        let frame = tokio::select! {
            () = closed.cancelled() => break CloseReason::SessionClosed,
            () = shutdown.cancelled() => break CloseReason::Shutdown,
            frame = ws_rx.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                break CloseReason::Transport;
            }
            None => break CloseReason::PeerClosed,
        };
        session.mark_alive();

        match msg {
            Message::Text(text) => dispatch(&hub, &session, text.as_str()),
            // Some clients send JSON in binary frames.
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => dispatch(&hub, &session, text),
                Err(_) => debug!(len = data.len(), "dropping non-UTF8 binary frame"),
            },
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                debug!("client sent close frame");
                break CloseReason::PeerClosed;
            }
        }
    };

    // Leave the registry before waiting on the writer, which may still be
    // unwinding a stalled write.
    session.close();
    let _ = hub.close_session(session.id());
    let _ = writer.await;
    let _ = heartbeat.await;
    session.transition(ConnectionState::Closed);

    info!(reason = reason.as_str(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

fn dispatch(hub: &Hub, session: &Session, text: &str) {
    match hub.handle_inbound(session.id(), text) {
        Ok(InboundOutcome::Announced(identity)) => {
            debug!(name = %identity.display_name, "identity applied");
        }
        Ok(InboundOutcome::Relayed(outcome)) => {
            debug!(recipients = outcome.recipients, dropped = outcome.dropped, "frame relayed");
        }
        Err(e) => {
            counter!(HUB_PROTOCOL_ERRORS_TOTAL, "reason" => protocol_error_reason(&e)).increment(1);
            warn!(error = %e, "dropping inbound frame");
        }
    }
}

fn protocol_error_reason(err: &ProtocolError) -> &'static str {
    match err {
        ProtocolError::Malformed(_) => "malformed",
        ProtocolError::InvalidIdentity(_) => "invalid_identity",
        ProtocolError::ServerOnly(_) => "server_only",
    }
}

/// Drain the outbound queue into the socket, pinging every `ping_every`.
///
/// Each write is bounded by `send_timeout` and abandoned as soon as the
/// session closes; a failed or timed-out write closes the session.
async fn run_writer(
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Arc<String>>,
    session: Arc<Session>,
    send_timeout: Duration,
    ping_every: Duration,
) {
    let closed = session.cancel_token();
    let mut ping = time::interval(ping_every);
    let _ = ping.tick().await;

    loop {
        let frame = tokio::select! {
            biased;
            () = closed.cancelled() => break,
            next = outbound.recv() => match next {
                Some(text) => Message::Text(String::clone(&text).into()),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Vec::new().into()),
        };

        let written = tokio::select! {
            () = closed.cancelled() => {
                debug!("session closed during write, abandoning frame");
                break;
            }
            written = time::timeout(send_timeout, sink.send(frame)) => written,
        };
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "websocket write failed");
                break;
            }
            Err(_) => {
                warn!(
                    timeout_ms = send_timeout.as_millis(),
                    "websocket write timed out, closing session"
                );
                break;
            }
        }
    }

    session.close();
    drop(outbound);
    let _ = time::timeout(send_timeout.min(CLOSE_TIMEOUT), sink.close()).await;
}

async fn watch_heartbeat(session: Arc<Session>, interval: Duration, timeout: Duration) {
    let cancel = session.cancel_token();
    if run_heartbeat(Arc::clone(&session), interval, timeout, cancel).await
        == HeartbeatResult::TimedOut
    {
        warn!(
            silent_ms = session.last_seen_elapsed().as_millis(),
            "client unresponsive, closing session"
        );
        session.close();
    }
}
