//! Sessions, peers, and connection handles.
//!
//! A [`Session`] is one client's hosted group: the connection that owns it,
//! the banner handed to new joiners, and the set of directed [`Peer`] edges
//! it can broadcast to. If B is a peer of A, A's `publish` reaches B.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Opaque session identifier, rendered as a random UUIDv4.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Event queued for a connection's writer half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame to deliver.
    Frame(String),
    /// Send a close frame and stop the connection.
    Close,
}

/// Send/close capability for one client connection.
///
/// Cloning is cheap; every clone feeds the same per-connection queue, which
/// the owning worker drains in order. Sending never blocks the caller.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    session: SessionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its owning worker drains.
    pub fn new(session: SessionId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { session, tx }, rx)
    }

    /// Queue a text frame. Returns `false` if the connection is already gone.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        if self.tx.send(Outbound::Frame(frame.into())).is_ok() {
            crate::metrics::record_frame_sent();
            true
        } else {
            debug!(target_session = %self.session, "Dropped frame for closed connection");
            crate::metrics::record_send_failure();
            false
        }
    }

    /// Ask the owning worker to close the connection.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Session this handle belongs to.
    pub fn session(&self) -> &SessionId {
        &self.session
    }
}

/// A directed membership edge: the owning session can address `conn`.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: SessionId,
    pub conn: ConnectionHandle,
}

/// One connected client's group.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    host: ConnectionHandle,
    banner: String,
    peers: HashMap<SessionId, Peer>,
}

impl Session {
    pub fn new(id: SessionId, host: ConnectionHandle) -> Self {
        Self {
            id,
            host,
            banner: String::new(),
            peers: HashMap::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn host(&self) -> &ConnectionHandle {
        &self.host
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Insert a peer edge if absent.
    ///
    /// Returns `true` when the edge was newly added. The session's own id is
    /// never accepted, so a session cannot become its own peer.
    pub fn add_peer(&mut self, id: SessionId, conn: ConnectionHandle) -> bool {
        if id == self.id {
            return false;
        }
        match self.peers.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let id = slot.key().clone();
                slot.insert(Peer { id, conn });
                true
            }
        }
    }

    /// Remove a peer edge. Returns whether one was present.
    pub fn remove_peer(&mut self, id: &str) -> bool {
        self.peers.remove(id).is_some()
    }

    pub fn set_banner(&mut self, banner: String) {
        self.banner = banner;
    }

    pub fn peer(&self, id: &str) -> Option<&Peer> {
        self.peers.get(id)
    }

    #[cfg(test)]
    pub fn has_peer(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Snapshot of the current peers, safe to iterate after the registry
    /// lock is released.
    pub fn list_peers(&self) -> Vec<Peer> {
        self.peers.values().cloned().collect()
    }
}
