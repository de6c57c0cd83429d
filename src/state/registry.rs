//! The session registry - shared state for the relay.
//!
//! Every live [`Session`] is stored here, keyed by [`SessionId`], behind one
//! process-wide mutex. The same lock covers registry structure and every
//! session's peer list, so a membership change can never interleave with the
//! disconnect scrub of another session.
//!
//! The lock is synchronous and is never held across an `.await`: callers
//! collect the frames they want to send while holding a [`RegistryGuard`]
//! and send them after the guard is dropped.

use crate::error::RegistryError;
use crate::state::{Session, SessionId};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;

/// Lock-guarded map from session id to session.
#[derive(Default)]
pub struct Registry {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take exclusive access to the registry and all sessions in it.
    pub fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            sessions: self.sessions.lock(),
        }
    }

    /// Register a new session under its id.
    pub fn register(&self, session: Session) -> Result<(), RegistryError> {
        self.lock().register(session)?;
        crate::metrics::inc_sessions();
        Ok(())
    }

    /// Scrub a terminated session from the registry.
    ///
    /// In one critical section, removes `id` from every other session's peer
    /// list and then removes the session itself. Returns the number of
    /// reverse edges purged. A second call for the same id is a no-op.
    pub fn disconnect(&self, id: &SessionId) -> usize {
        let mut guard = self.lock();
        let mut purged = 0;
        guard.for_each(|other| {
            if other.id() != id && other.remove_peer(id.as_str()) {
                purged += 1;
            }
        });
        let removed = guard.remove(id.as_str()).is_some();
        drop(guard);

        if removed {
            crate::metrics::dec_sessions();
        }
        purged
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Ask every live connection to close. Returns how many were asked.
    ///
    /// Sessions leave the registry through their own disconnect scrub once
    /// their workers stop.
    pub fn close_all(&self) -> usize {
        let hosts: Vec<_> = {
            let guard = self.lock();
            guard.sessions.values().map(|s| s.host().clone()).collect()
        };
        for host in &hosts {
            host.close();
        }
        hosts.len()
    }
}

/// Exclusive view of the registry, held for the duration of one operation.
pub struct RegistryGuard<'a> {
    sessions: MutexGuard<'a, HashMap<SessionId, Session>>,
}

impl RegistryGuard<'_> {
    /// Insert a session. Fails if its id is already live.
    pub fn register(&mut self, session: Session) -> Result<(), RegistryError> {
        if self.sessions.contains_key(session.id()) {
            return Err(RegistryError::DuplicateSession(session.id().clone()));
        }
        self.sessions.insert(session.id().clone(), session);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn lookup_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Remove a session, returning it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// Visit every live session.
    pub fn for_each(&mut self, mut f: impl FnMut(&mut Session)) {
        for session in self.sessions.values_mut() {
            f(session);
        }
    }
}
