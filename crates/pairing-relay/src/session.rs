//! Session store: maps pairing codes to the controller/client pair joined under them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::protocol::{Outbound, PairingCode, Presence, Role};

/// Process-unique connection identifier.
pub type ConnectionId = u64;

/// Non-owning handle to a live connection.
///
/// The connection task owns the socket; the store only holds the sending half
/// of its outbound queue and a token that asks the task to close.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
    closer: CancellationToken,
}

impl PeerHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<String>, closer: CancellationToken) -> Self {
        Self { id, tx, closer }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.closer.is_cancelled() && !self.tx.is_closed()
    }

    /// Best-effort, non-blocking send. Returns false if the message was not queued.
    pub fn send(&self, message: &Outbound) -> bool {
        if !self.is_open() {
            return false;
        }
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(conn = self.id, error = %e, "Failed to encode message");
                return false;
            }
        };
        match self.tx.try_send(json) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(conn = self.id, error = %e, "Dropping message");
                false
            }
        }
    }

    pub fn close(&self) {
        self.closer.cancel();
    }
}

/// A session holds at most one connection per role.
pub struct Session {
    pub controller: Option<PeerHandle>,
    pub client: Option<PeerHandle>,
    pub created_at: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            controller: None,
            client: None,
            created_at: Instant::now(),
        }
    }

    fn slot(&self, role: Role) -> Option<&PeerHandle> {
        match role {
            Role::Controller => self.controller.as_ref(),
            Role::Client => self.client.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<PeerHandle> {
        match role {
            Role::Controller => &mut self.controller,
            Role::Client => &mut self.client,
        }
    }

    fn is_empty(&self) -> bool {
        self.controller.is_none() && self.client.is_none()
    }

    fn open(&self, role: Role) -> Option<&PeerHandle> {
        self.slot(role).filter(|peer| peer.is_open())
    }

    fn presence(&self) -> Presence {
        Presence {
            client_present: self.open(Role::Client).is_some(),
            control_present: self.open(Role::Controller).is_some(),
        }
    }
}

/// Result of removing a connection from its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The slot already belongs to someone else (the connection was replaced).
    NotMember,
    /// The session lost its last member and was removed.
    SessionClosed { age: Duration },
    /// The other role is still joined.
    Remaining,
}

/// Thread-safe session store.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<PairingCode, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `peer` to (code, role), creating the session if needed.
    ///
    /// A connection already holding the slot is told to close and returned.
    pub async fn join(&self, code: &PairingCode, role: Role, peer: PeerHandle) -> Option<PeerHandle> {
        let mut map = self.sessions.write().await;
        let session = map.entry(code.clone()).or_insert_with(Session::new);
        let previous = session.slot_mut(role).replace(peer);
        if let Some(stale) = &previous {
            stale.close();
        }
        previous
    }

    /// Remove connection `id` from (code, role) if it still owns that slot.
    pub async fn leave(&self, code: &PairingCode, role: Role, id: ConnectionId) -> Departure {
        let mut map = self.sessions.write().await;
        let Some(session) = map.get_mut(code) else {
            return Departure::NotMember;
        };
        let slot = session.slot_mut(role);
        if slot.as_ref().map(PeerHandle::id) != Some(id) {
            return Departure::NotMember;
        }
        *slot = None;

        if session.is_empty() {
            let age = session.created_at.elapsed();
            map.remove(code);
            Departure::SessionClosed { age }
        } else {
            Departure::Remaining
        }
    }

    /// The open connection holding `role` in the session, if any.
    pub async fn peer(&self, code: &PairingCode, role: Role) -> Option<PeerHandle> {
        let map = self.sessions.read().await;
        map.get(code)?.open(role).cloned()
    }

    /// Current presence for a session, or `None` if it does not exist.
    #[cfg(test)]
    pub async fn presence(&self, code: &PairingCode) -> Option<Presence> {
        let map = self.sessions.read().await;
        map.get(code).map(Session::presence)
    }

    /// Send `peer_status` to every open member of the session.
    ///
    /// Holds the write lock while queueing so broadcasts reach each peer in the
    /// order the table changed. Sends are `try_send` and never wait.
    pub async fn broadcast_presence(&self, code: &PairingCode) -> Option<Presence> {
        let map = self.sessions.write().await;
        let session = map.get(code)?;
        let presence = session.presence();

        let message = Outbound::PeerStatus(presence);
        for role in [Role::Client, Role::Controller] {
            if let Some(member) = session.open(role) {
                member.send(&message);
            }
        }
        Some(presence)
    }

    /// Number of active sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
