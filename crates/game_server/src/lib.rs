//! # Game Server - Transport to Simulation Pipeline
//!
//! A WebSocket game server in which asynchronous I/O and a fixed-rate,
//! single-threaded simulation meet through lock-free queues.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Listener** ([`net::Listener`]) - accepts TCP connections, runs the
//!   upgrade handshake and sub-protocol check, assigns connection ids
//! * **Connection** ([`net::Connection`]) - per-client state machine with an
//!   ordered outbound queue
//! * **Event Bridge** ([`bridge::EventBridge`]) - open, message and close
//!   queues drained once per tick
//! * **World** ([`game::World`]) - owns the session registry and runs the tick
//! * **Dispatch** ([`game::dispatch`]) - opcode to typed handler routing
//! * **World Manager** ([`game::WorldManager`]) - one thread per world,
//!   least-populated routing for new connections
//!
//! ### Message Flow
//!
//! 1. A client sends a binary frame `[opcode: u16][body]`
//! 2. Its connection forwards the bytes to its world's event bridge
//! 3. The world drains the bridge on its next tick and looks up the session
//! 4. Dispatch decodes the body and runs the handler for that opcode
//! 5. The handler may answer through the session's weak socket handle
//!
//! ## Error Handling
//!
//! Malformed client input is dropped without closing the connection. Only
//! transport failures or an explicit close end a connection. Startup failures
//! surface as [`ServerError`].
//!
//! ## Thread Safety
//!
//! * Sessions are touched only by their world's thread
//! * The simulation holds connections through `Weak` handles only
//! * Connection ids come from one shared atomic counter

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::GameServer;
pub use shutdown::Shutdown;

pub mod bridge;
pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod server;
pub mod shutdown;

#[cfg(test)]
mod testing;
