//! Server orchestration.

mod core;

pub use self::core::GameServer;
