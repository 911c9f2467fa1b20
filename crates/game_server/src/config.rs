//! Server configuration types and defaults.
//!
//! The library only ever sees this resolved struct. Reading it from a file
//! and applying command-line overrides is the binary's job.

use crate::error::ServerError;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Configuration structure for the game server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Number of independent simulation worlds
    pub worlds: usize,

    /// Ticks per second for every world
    pub tick_rate: u32,

    /// Sub-protocol token a client must offer during the handshake
    pub auth_token: String,

    /// Deadline for reading and answering the upgrade request
    pub handshake_timeout: Duration,

    /// Largest application message accepted from a client, in bytes
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            worlds: 1,
            tick_rate: 60,
            auth_token: "test".to_string(),
            handshake_timeout: Duration::from_secs(10),
            max_message_size: 256,
        }
    }
}

impl ServerConfig {
    /// Wall-clock time between two ticks of a world.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    /// Checks the values a running server depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.worlds == 0 {
            return Err(ServerError::Config("worlds must be at least 1".into()));
        }
        if self.worlds > usize::from(u16::MAX) + 1 {
            return Err(ServerError::Config(format!(
                "worlds must not exceed {}",
                usize::from(u16::MAX) + 1
            )));
        }
        if self.tick_rate == 0 {
            return Err(ServerError::Config("tick_rate must be greater than 0".into()));
        }
        if self.max_message_size < protocol::OPCODE_SIZE {
            return Err(ServerError::Config(format!(
                "max_message_size must be at least {} bytes",
                protocol::OPCODE_SIZE
            )));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ServerError::Config(
                "handshake_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
