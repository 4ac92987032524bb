//! Heartbeat liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::session::Session;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The peer stayed silent past the timeout.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Watch a session's alive flag.
///
/// At each `interval` tick the flag is read and reset. A tick that finds no
/// activity since the previous one counts as a miss; `timeout / interval`
/// consecutive misses (at least one) end the loop with `TimedOut`.
pub async fn run_heartbeat(
    session: Arc<Session>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    // The first tick completes immediately.
    let _ = check_interval.tick().await;

    let interval_ms = interval.as_millis().max(1);
    let max_missed = u32::try_from((timeout.as_millis() / interval_ms).max(1)).unwrap_or(u32::MAX);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if session.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
