//! Presence publishing (`CONNECTED_USERS`).

use std::sync::Arc;

use floorsync_core::{ApplicationMessage, PresenceEntry, PresenceSnapshot, SessionId};
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::broadcast::fan_out;
use super::registry::ConnectionRegistry;
use super::session::Session;
use crate::metrics::{HUB_EVICTIONS_TOTAL, HUB_PRESENCE_PUBLISHES_TOTAL};

/// What one [`PresencePublisher::publish`] call did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Snapshots broadcast, including follow-up rounds after evictions.
    pub rounds: usize,
    /// Sessions that received the final snapshot.
    pub delivered: usize,
    /// `count` carried by the final snapshot.
    pub count: usize,
    /// Sessions evicted while publishing.
    pub evicted: Vec<SessionId>,
}

/// Builds and broadcasts presence snapshots.
///
/// Publishes are serialized, so the last snapshot a client receives always
/// reflects every registry mutation that happened before its publish began.
pub struct PresencePublisher {
    max_dropped: u64,
    gate: Mutex<()>,
}

impl PresencePublisher {
    /// Sessions whose lifetime drops reach `max_dropped` are evicted.
    pub fn new(max_dropped: u64) -> Self {
        Self {
            max_dropped: max_dropped.max(1),
            gate: Mutex::new(()),
        }
    }

    /// Current presence derived from the registry.
    pub fn snapshot(&self, registry: &ConnectionRegistry) -> PresenceSnapshot {
        snapshot_of(&registry.list())
    }

    /// Broadcast a fresh snapshot to every admitted session.
    ///
    /// Recipients that are closed or over the drop threshold are removed
    /// and another round is published, until a round evicts nobody.
    pub fn publish(&self, registry: &ConnectionRegistry) -> PublishReport {
        let _gate = self.gate.lock();
        let mut report = PublishReport::default();

        loop {
            let sessions = registry.list();
            let snapshot = snapshot_of(&sessions);
            let frame = match ApplicationMessage::presence(&snapshot).and_then(|m| m.encode()) {
                Ok(json) => Arc::new(json),
                Err(e) => {
                    warn!(error = %e, "failed to serialize presence snapshot");
                    return report;
                }
            };

            let outcome = fan_out(&sessions, &frame);
            counter!(HUB_PRESENCE_PUBLISHES_TOTAL).increment(1);
            report.rounds += 1;
            report.delivered = outcome.delivered;
            report.count = snapshot.count;
            debug!(
                count = snapshot.count,
                announced = snapshot.entries.len(),
                recipients = outcome.recipients,
                "presence published"
            );

            let mut evicted_any = false;
            for session in outcome.evictable(self.max_dropped) {
                if registry.remove(session.id()).is_some() {
                    info!(
                        session_id = %session.id(),
                        dropped = session.drop_count(),
                        "evicting unresponsive session"
                    );
                    counter!(HUB_EVICTIONS_TOTAL).increment(1);
                    report.evicted.push(session.id().clone());
                    evicted_any = true;
                }
            }
            if !evicted_any {
                return report;
            }
        }
    }
}

/// Build a snapshot from a session list.
///
/// Entries cover announced sessions only, oldest first with ties broken by id.
pub fn snapshot_of(sessions: &[Arc<Session>]) -> PresenceSnapshot {
    let mut announced: Vec<(&Arc<Session>, PresenceEntry)> = sessions
        .iter()
        .filter_map(|s| {
            s.identity().map(|identity| {
                (
                    s,
                    PresenceEntry {
                        display_name: identity.display_name,
                        connected_at: s.connected_at(),
                        avatar_url: identity.avatar_url,
                    },
                )
            })
        })
        .collect();
    announced.sort_by(|(a, ea), (b, eb)| {
        ea.connected_at
            .cmp(&eb.connected_at)
            .then_with(|| a.id().cmp(b.id()))
    });

    PresenceSnapshot {
        count: sessions.len(),
        entries: announced.into_iter().map(|(_, entry)| entry).collect(),
    }
}
