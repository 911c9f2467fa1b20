//! Core game server implementation.
//!
//! `GameServer` wires the listener, the worlds and the shutdown signal
//! together and owns their startup and teardown order.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game::{no_scripting, ScriptFactory, WorldManager, WorldRouter};
use crate::net::Listener;
use crate::shutdown::Shutdown;
use std::sync::Arc;
use tracing::info;

/// The core game server structure.
///
/// # Lifecycle
///
/// 1. [`GameServer::bind`] opens the listening socket. Failure here is fatal
///    and nothing else has started yet.
/// 2. [`GameServer::serve`] starts one thread per world, then accepts
///    connections until the [`Shutdown`] handle fires.
/// 3. On shutdown the listener stops accepting, open connections are closed,
///    and every world finishes its current tick before its thread is joined.
///
/// [`GameServer::start`] performs all three steps.
pub struct GameServer {
    config: ServerConfig,
    worlds: WorldManager,
    shutdown: Shutdown,
}

impl GameServer {
    /// Creates a server whose worlds have no scripting engine.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_scripts(config, no_scripting())
    }

    /// Creates a server that builds one script engine per world with `scripts`.
    ///
    /// # Arguments
    ///
    /// * `config` - Network, world and protocol settings
    /// * `scripts` - Factory called once per world at construction
    pub fn with_scripts(config: ServerConfig, scripts: ScriptFactory) -> Self {
        let worlds = WorldManager::new(config.worlds, config.tick_interval(), &scripts);
        Self {
            config,
            worlds,
            shutdown: Shutdown::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle that stops the server when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// The router that assigns connections to worlds.
    pub fn router(&self) -> Arc<WorldRouter> {
        self.worlds.router()
    }

    /// Validates the configuration and binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an invalid configuration or
    /// [`ServerError::Network`] if the address cannot be bound.
    pub fn bind(&self) -> Result<Listener, ServerError> {
        self.config.validate()?;
        Listener::bind(&self.config, self.worlds.router())
    }

    /// Runs the worlds and the accept loop until shutdown.
    pub async fn serve(&mut self, listener: Listener) -> Result<(), ServerError> {
        match listener.local_addr() {
            Ok(addr) => info!("🚀 Starting game server on {}", addr),
            Err(_) => info!("🚀 Starting game server"),
        }

        self.worlds.start()?;
        info!(
            "🌍 {} world(s) ticking at {} Hz",
            self.worlds.len(),
            self.config.tick_rate
        );

        listener.run(self.shutdown.clone()).await;

        info!("🧹 Stopping worlds...");
        // Joins are bounded by one tick of each world.
        self.worlds.stop();

        info!("Server stopped");
        Ok(())
    }

    /// Binds and serves until shutdown.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }
}
