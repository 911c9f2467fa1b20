//! Error types for the game server.

use thiserror::Error;

/// Errors that can occur while starting or running the server.
///
/// Per-connection failures never surface here; they are reported through
/// [`Handler::on_error`](crate::net::Handler::on_error) and end only the
/// connection they belong to.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Binding or accepting on the listening socket failed
    #[error("Network error: {0}")]
    Network(String),

    /// The supplied [`ServerConfig`](crate::ServerConfig) is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A world thread could not be started or stopped
    #[error("Internal error: {0}")]
    Internal(String),
}
