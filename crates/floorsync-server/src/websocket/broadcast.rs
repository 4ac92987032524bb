//! Frame fan-out to a snapshot of sessions.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::session::Session;
use crate::errors::DeliveryError;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Result of delivering one frame to a set of sessions.
#[derive(Debug, Default)]
pub struct FanOut {
    /// Sessions the frame was addressed to.
    pub recipients: usize,
    /// Successful enqueues.
    pub delivered: usize,
    /// Per-session failures; never abort the rest of the fan-out.
    pub failed: Vec<(Arc<Session>, DeliveryError)>,
}

impl FanOut {
    /// Failed sessions that should be evicted.
    pub fn evictable(&self, max_dropped: u64) -> Vec<Arc<Session>> {
        self.failed
            .iter()
            .filter(|(session, _)| session.should_evict(max_dropped))
            .map(|(session, _)| Arc::clone(session))
            .collect()
    }

    /// Number of frames dropped on full queues.
    pub fn dropped(&self) -> usize {
        self.failed
            .iter()
            .filter(|(_, e)| *e == DeliveryError::Full)
            .count()
    }
}

/// Enqueue one shared frame on every session in `sessions`.
pub fn fan_out(sessions: &[Arc<Session>], frame: &Arc<String>) -> FanOut {
    let mut outcome = FanOut {
        recipients: sessions.len(),
        ..FanOut::default()
    };
    for session in sessions {
        match session.send(Arc::clone(frame)) {
            Ok(()) => outcome.delivered += 1,
            Err(err) => {
                if err == DeliveryError::Full {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(
                        session_id = %session.id(),
                        dropped = session.drop_count(),
                        "outbound queue full, dropping frame"
                    );
                } else {
                    debug!(session_id = %session.id(), "skipping closed session");
                }
                outcome.failed.push((Arc::clone(session), err));
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sessions(n: usize, capacity: usize) -> (Vec<Arc<Session>>, Vec<mpsc::Receiver<Arc<String>>>) {
        (0..n).map(|_| Session::channel(capacity)).unzip()
    }

    #[test]
    fn one_copy_per_session() {
        let (targets, mut rxs) = sessions(3, 4);
        let frame = Arc::new(r#"{"type":"NEW_ORDER","payload":{}}"#.to_string());
        let outcome = fan_out(&targets, &frame);

        assert_eq!(outcome.recipients, 3);
        assert_eq!(outcome.delivered, 3);
        assert!(outcome.failed.is_empty());
        for rx in &mut rxs {
            let got = rx.try_recv().unwrap();
            assert!(Arc::ptr_eq(&got, &frame));
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn closed_session_does_not_fail_others() {
        let (targets, mut rxs) = sessions(3, 4);
        targets[1].close();
        let outcome = fan_out(&targets, &Arc::new("x".to_string()));

        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].1, DeliveryError::Closed);
        assert!(rxs[0].try_recv().is_ok());
        assert!(rxs[2].try_recv().is_ok());
    }

    #[test]
    fn full_queue_counts_as_drop() {
        let (targets, _rxs) = sessions(2, 1);
        let _ = fan_out(&targets, &Arc::new("a".to_string()));
        let outcome = fan_out(&targets, &Arc::new("b".to_string()));
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.dropped(), 2);
        assert!(outcome.evictable(5).is_empty());
        assert_eq!(outcome.evictable(1).len(), 2);
    }

    #[test]
    fn closed_sessions_are_always_evictable() {
        let (targets, _rxs) = sessions(1, 4);
        targets[0].close();
        let outcome = fan_out(&targets, &Arc::new("x".to_string()));
        assert_eq!(outcome.evictable(u64::MAX).len(), 1);
        assert_eq!(outcome.dropped(), 0);
    }

    #[test]
    fn empty_fan_out_is_not_an_error() {
        let outcome = fan_out(&[], &Arc::new("x".to_string()));
        assert_eq!(outcome.recipients, 0);
        assert_eq!(outcome.delivered, 0);
    }
}
