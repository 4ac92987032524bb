//! Connection registry: the hub's only shared mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use floorsync_core::{Identity, SessionId};
use parking_lot::Mutex;
use tracing::{debug, error};

use super::session::Session;
use crate::errors::RegistryError;

/// All admitted sessions, keyed by id.
///
/// Every operation takes the same lock. [`remove`](Self::remove) closes the
/// session before the lock is released, so a session is never observable
/// in the map after it was closed through the registry.
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a session.
    ///
    /// If the id is already present the newer session replaces the older
    /// one, which is closed, and `DuplicateSession` is returned. The new
    /// session is admitted either way.
    pub fn admit(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let id = session.id().clone();
        let mut sessions = self.sessions.lock();
        match sessions.insert(id.clone(), session) {
            None => {
                debug!(session_id = %id, total = sessions.len(), "session admitted");
                Ok(())
            }
            Some(previous) => {
                previous.close();
                error!(session_id = %id, "duplicate session id admitted, replaced older session");
                Err(RegistryError::DuplicateSession(id))
            }
        }
    }

    /// Remove and close a session. Absent ids are a no-op.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        let removed = sessions.remove(id);
        if let Some(session) = &removed {
            session.close();
            debug!(session_id = %id, total = sessions.len(), "session removed");
        }
        removed
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Copied snapshot of every admitted session.
    pub fn list(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().cloned().collect()
    }

    /// Bind an identity to a session. Returns whether the session exists.
    pub fn set_identity(&self, id: &SessionId, identity: Identity) -> bool {
        let sessions = self.sessions.lock();
        match sessions.get(id) {
            Some(session) => {
                session.set_identity(identity);
                true
            }
            None => false,
        }
    }

    /// Number of admitted sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no session is admitted.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Number of sessions with an identity.
    pub fn announced_count(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.is_announced())
            .count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn session(id: &str) -> (Arc<Session>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(Session::with_id(SessionId::from(id), tx)), rx)
    }

    #[test]
    fn admit_and_get() {
        let registry = ConnectionRegistry::new();
        let (s1, _rx) = session("s1");
        registry.admit(s1).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&SessionId::from("s1")).is_some());
        assert!(registry.get(&SessionId::from("missing")).is_none());
    }

    #[test]
    fn remove_closes_session() {
        let registry = ConnectionRegistry::new();
        let (s1, _rx) = session("s1");
        let token = s1.cancel_token();
        registry.admit(s1).unwrap();

        let removed = registry.remove(&SessionId::from("s1")).unwrap();
        assert!(removed.is_closed());
        assert!(token.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_twice_equals_once() {
        let registry = ConnectionRegistry::new();
        let (s1, _r1) = session("s1");
        let (s2, _r2) = session("s2");
        registry.admit(s1).unwrap();
        registry.admit(s2).unwrap();

        assert!(registry.remove(&SessionId::from("s1")).is_some());
        assert!(registry.remove(&SessionId::from("s1")).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        assert!(registry.remove(&SessionId::from("nobody")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_admission_newer_wins() {
        let registry = ConnectionRegistry::new();
        let (old, _r1) = session("dup");
        let (new, _r2) = session("dup");
        registry.admit(old.clone()).unwrap();
        new.set_identity(Identity::named("Newer"));

        let err = registry.admit(new).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateSession(SessionId::from("dup")));
        assert!(old.is_closed());
        assert_eq!(registry.len(), 1);
        let current = registry.get(&SessionId::from("dup")).unwrap();
        assert_eq!(current.identity().unwrap().display_name, "Newer");
        assert!(!current.is_closed());
    }

    #[test]
    fn list_is_a_copy() {
        let registry = ConnectionRegistry::new();
        let (s1, _r1) = session("s1");
        registry.admit(s1).unwrap();
        let snapshot = registry.list();
        let _ = registry.remove(&SessionId::from("s1"));
        assert_eq!(snapshot.len(), 1);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn set_identity_reports_existence() {
        let registry = ConnectionRegistry::new();
        let (s1, _r1) = session("s1");
        let (s2, _r2) = session("s2");
        registry.admit(s1).unwrap();
        registry.admit(s2).unwrap();

        assert!(registry.set_identity(&SessionId::from("s1"), Identity::named("Alice")));
        assert!(!registry.set_identity(&SessionId::from("ghost"), Identity::named("Ghost")));
        assert_eq!(registry.announced_count(), 1);
        assert!(registry.get(&SessionId::from("s2")).unwrap().identity().is_none());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Admit(u8),
            Remove(u8),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..16).prop_map(Op::Admit),
                (0u8..16).prop_map(Op::Remove),
            ]
        }

        proptest! {
            #[test]
            fn len_is_admits_minus_matched_removes(ops in proptest::collection::vec(op(), 0..64)) {
                let registry = ConnectionRegistry::new();
                let mut live: std::collections::HashSet<u8> = std::collections::HashSet::new();
                let mut receivers = Vec::new();
                let mut admits = 0usize;
                let mut matched_removes = 0usize;

                for op in ops {
                    match op {
                        Op::Admit(n) if !live.contains(&n) => {
                            let (s, rx) = session(&format!("s{n}"));
                            receivers.push(rx);
                            prop_assert!(registry.admit(s).is_ok());
                            let _ = live.insert(n);
                            admits += 1;
                        }
                        Op::Admit(_) => {}
                        Op::Remove(n) => {
                            let removed = registry.remove(&SessionId::from(format!("s{n}")));
                            prop_assert_eq!(removed.is_some(), live.remove(&n));
                            if removed.is_some() {
                                matched_removes += 1;
                            }
                        }
                    }
                    prop_assert_eq!(registry.len(), admits - matched_removes);
                    prop_assert_eq!(registry.list().len(), registry.len());
                }
            }
        }
    }
}
