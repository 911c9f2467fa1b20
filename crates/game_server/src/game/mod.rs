//! Simulation side: worlds, sessions and opcode dispatch.
//!
//! Everything here runs on world threads. The only inputs are the events a
//! world drains from its [`EventBridge`](crate::bridge::EventBridge), and the
//! only outputs are messages sent through weak socket handles.

pub mod dispatch;
pub mod router;
pub mod script;
pub mod session;
pub mod world;

pub use dispatch::{dispatch, Context};
pub use router::{WorldManager, WorldRouter};
pub use script::{no_scripting, NoScripting, ScriptEngine, ScriptError, ScriptFactory};
pub use session::{Session, SessionRegistry};
pub use world::World;

/// Identifies a world within one server process.
pub type WorldId = u16;
