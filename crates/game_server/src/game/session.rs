//! Player sessions and the per-world registry that owns them.

use crate::net::{ConnectionId, Socket};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Simulation-side record of one connected player.
///
/// Holds only a weak handle to the connection, so sending through a session
/// whose connection has gone away is a silent no-op.
pub struct Session {
    id: ConnectionId,
    socket: Weak<dyn Socket>,
    connected_at: Instant,
}

impl Session {
    pub fn new(id: ConnectionId, socket: Weak<dyn Socket>) -> Self {
        Self {
            id,
            socket,
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The live connection, if it still exists.
    pub fn socket(&self) -> Option<Arc<dyn Socket>> {
        self.socket.upgrade()
    }

    pub fn is_open(&self) -> bool {
        self.socket().is_some_and(|socket| socket.is_open())
    }

    /// Sends `data` if the connection is still open.
    pub fn send(&self, data: Vec<u8>) -> bool {
        match self.socket() {
            Some(socket) => socket.send(data),
            None => false,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Map from connection id to [`Session`], owned by a single world.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `session` unless one already exists for its id.
    ///
    /// Returns `false` and keeps the existing session on a duplicate.
    pub fn insert(&mut self, session: Session) -> bool {
        match self.sessions.entry(session.id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        }
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestSocket;

    #[test]
    fn test_send_through_live_session() {
        let socket = TestSocket::new(1);
        let session = Session::new(1, TestSocket::weak(&socket));
        assert!(session.is_open());
        assert!(session.send(vec![9]));
        assert_eq!(socket.sent(), vec![vec![9]]);
    }

    #[test]
    fn test_send_after_connection_dropped_is_noop() {
        let socket = TestSocket::new(1);
        let session = Session::new(1, TestSocket::weak(&socket));
        drop(socket);
        assert!(session.socket().is_none());
        assert!(!session.is_open());
        assert!(!session.send(vec![9]));
    }

    #[test]
    fn test_send_after_close_is_noop() {
        let socket = TestSocket::new(1);
        let session = Session::new(1, TestSocket::weak(&socket));
        socket.close();
        assert!(!session.send(vec![9]));
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn test_registry_keeps_first_session_on_duplicate() {
        let first = TestSocket::new(5);
        let second = TestSocket::new(5);
        let mut registry = SessionRegistry::new();

        assert!(registry.insert(Session::new(5, TestSocket::weak(&first))));
        assert!(!registry.insert(Session::new(5, TestSocket::weak(&second))));
        assert_eq!(registry.len(), 1);

        registry.get(5).unwrap().send(vec![1]);
        assert_eq!(first.sent(), vec![vec![1]]);
        assert!(second.sent().is_empty());

        assert!(registry.remove(5).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(5).is_none());
    }
}
