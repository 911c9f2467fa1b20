//! Main application entry point for the game server.
//!
//! Loads configuration, installs logging, builds the Tokio runtime with the
//! configured number of I/O threads and runs the server until a termination
//! signal arrives.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{Context, Result};
use cli::CliArgs;
use config::{AppConfig, Source};
use game_server::GameServer;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Main application struct.
struct Application {
    config: AppConfig,
    config_path: PathBuf,
    server: GameServer,
}

impl Application {
    fn new(args: CliArgs) -> Result<Self> {
        let (mut config, source) = AppConfig::load(&args.config_path)?;
        config.apply_cli(&args);
        config
            .validate()
            .context("Configuration validation failed")?;

        logging::setup_logging(&config.log_level, config.json_logs)?;
        info!("🔧 Logging initialized with level: {}", config.log_level);
        if source == Source::CreatedDefault {
            warn!(
                "Configuration file not found, wrote defaults to {}",
                args.config_path.display()
            );
        }

        let server = GameServer::new(config.to_server_config()?);
        Ok(Self {
            config,
            config_path: args.config_path,
            server,
        })
    }

    async fn run(mut self) -> Result<()> {
        info!("🌟 Starting game server v{}", env!("CARGO_PKG_VERSION"));
        info!("📋 Configuration Summary:");
        info!("  📂 Config file: {}", self.config_path.display());
        info!("  🌐 Bind address: {}", self.config.bind_address()?);
        info!("  🧵 I/O threads: {}", self.config.worker_threads());
        info!("  🌍 Worlds: {} @ {} Hz", self.config.worlds, self.config.tick_rate);
        info!("  📦 Max message size: {} bytes", self.config.max_message_size);

        // Bind before anything else starts so a taken port aborts cleanly.
        let listener = self.server.bind()?;

        let shutdown = self.server.shutdown_handle();
        tokio::spawn(async move {
            match signals::wait_for_signal().await {
                Ok(()) => shutdown.trigger(),
                Err(e) => error!("Failed to install signal handlers: {}", e),
            }
        });

        self.server.serve(listener).await?;
        info!("✅ Server completed successfully");
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let app = match Application::new(args) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("❌ Failed to start: {e:#}");
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(app.config.worker_threads())
        .thread_name("io-worker")
        .enable_all()
        .build()
        .context("failed to build the Tokio runtime")?;

    if let Err(e) = runtime.block_on(app.run()) {
        error!("❌ Server error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
