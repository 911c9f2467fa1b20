//! Transport layer: WebSocket connections and the listener that accepts them.
//!
//! ## Roles
//!
//! * [`Socket`] - the send/close side of a live connection, as seen by the
//!   simulation through a [`Weak`] handle
//! * [`Handler`] - receives connection lifecycle callbacks from I/O tasks
//! * [`Router`] - picks the [`Handler`] a freshly accepted connection reports to
//!
//! Production code has one implementation of each ([`Connection`],
//! [`EventBridge`](crate::bridge::EventBridge), [`WorldRouter`](crate::game::WorldRouter)).
//! The traits exist so tests can drive the simulation without a network.

pub mod connection;
pub mod handshake;
pub mod listener;

pub use connection::{Connection, ConnectionState};
pub use handshake::{Authenticator, HandshakeError};
pub use listener::Listener;

use crate::game::WorldId;
use std::io;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Process-unique connection identifier, assigned after a successful handshake.
pub type ConnectionId = u32;

/// The outward-facing half of a connection.
pub trait Socket: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn is_open(&self) -> bool;

    /// Queues a binary message. Returns `false` if the connection is not open,
    /// in which case nothing is sent.
    fn send(&self, data: Vec<u8>) -> bool;

    /// Starts a graceful close. Calling it more than once has no extra effect.
    fn close(&self);
}

/// Receives events from connection I/O tasks.
///
/// Callbacks run on the async runtime and must not block.
pub trait Handler: Send + Sync {
    fn on_open(&self, id: ConnectionId, socket: Weak<dyn Socket>);

    fn on_message(&self, id: ConnectionId, data: Vec<u8>);

    /// Called exactly once per connection, when it is destroyed.
    fn on_close(&self, id: ConnectionId);

    /// Called for transport failures that are not part of a normal close.
    fn on_error(&self, id: ConnectionId, what: &str, error: &ConnectionError);
}

/// Assigns accepted connections to worlds.
pub trait Router: Send + Sync {
    /// Handler for a brand new connection.
    fn select(&self) -> Option<Arc<dyn Handler>>;

    /// Handler of a specific world, for reconnection or affinity.
    fn select_world(&self, world: WorldId) -> Option<Arc<dyn Handler>>;
}

/// A read or write failure on an open connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectionError {
    /// Whether this is an ordinary way for a connection to end.
    ///
    /// Normal close handshakes, peers vanishing and tasks aborted during
    /// shutdown all land here and are not reported as errors.
    pub fn is_benign(&self) -> bool {
        match self {
            ConnectionError::WebSocket(error) => match error {
                WsError::ConnectionClosed | WsError::AlreadyClosed => true,
                WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
                WsError::Io(error) => is_benign_io(error),
                _ => false,
            },
            ConnectionError::Io(error) => is_benign_io(error),
        }
    }
}

fn is_benign_io(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Interrupted
    )
}
