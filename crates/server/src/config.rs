//! Configuration file loading.
//!
//! The file format follows the extension: `.json` is read with `serde_json`,
//! anything else as TOML. Missing keys take their defaults. A missing file is
//! created with the defaults so there is something to edit next time.

use crate::cli::CliArgs;
use anyhow::{bail, Context, Result};
use game_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// IP address to listen on
    pub address: String,
    pub port: u16,
    /// I/O worker threads, 0 means one per CPU core
    pub threads: usize,
    /// World ticks per second
    #[serde(alias = "updateRate")]
    pub tick_rate: u32,
    #[serde(alias = "logLevel")]
    pub log_level: String,
    pub json_logs: bool,
    /// Number of independent simulation worlds
    pub worlds: usize,
    /// Sub-protocol token clients must offer
    pub auth_token: String,
    pub handshake_timeout_secs: u64,
    /// Largest accepted client message in bytes
    pub max_message_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            threads: 1,
            tick_rate: 60,
            log_level: "info".to_string(),
            json_logs: false,
            worlds: 1,
            auth_token: "test".to_string(),
            handshake_timeout_secs: 10,
            max_message_size: 256,
        }
    }
}

/// What [`AppConfig::load`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    File,
    CreatedDefault,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

impl AppConfig {
    /// Loads the configuration from `path`, writing a default file if absent.
    pub fn load(path: &Path) -> Result<(Self, Source)> {
        if !path.exists() {
            let config = AppConfig::default();
            let content = if is_json(path) {
                serde_json::to_string_pretty(&config)?
            } else {
                toml::to_string_pretty(&config)?
            };
            std::fs::write(path, content)
                .with_context(|| format!("failed to write default config {}", path.display()))?;
            return Ok((config, Source::CreatedDefault));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        };
        Ok((config, Source::File))
    }

    /// Applies command-line overrides on top of the file values.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(bind) = args.bind_address {
            self.address = bind.ip().to_string();
            self.port = bind.port();
        }
        if let Some(threads) = args.threads {
            self.threads = threads;
        }
        if let Some(worlds) = args.worlds {
            self.worlds = worlds;
        }
        if let Some(tick_rate) = args.tick_rate {
            self.tick_rate = tick_rate;
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
        if args.json_logs {
            self.json_logs = true;
        }
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .address
            .parse()
            .with_context(|| format!("invalid address {:?}", self.address))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// I/O worker threads to start, resolving 0 to the CPU count.
    pub fn worker_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_address()?;
        if self.tick_rate == 0 {
            bail!("tick_rate must be greater than 0");
        }
        if self.worlds == 0 {
            bail!("worlds must be at least 1");
        }
        if self.max_message_size < 2 {
            bail!("max_message_size must be at least 2 bytes");
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!(
                "log_level must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                self.log_level
            );
        }
        Ok(())
    }

    pub fn to_server_config(&self) -> Result<ServerConfig> {
        let config = ServerConfig {
            bind_address: self.bind_address()?,
            worlds: self.worlds,
            tick_rate: self.tick_rate,
            auth_token: self.auth_token.clone(),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            max_message_size: self.max_message_size,
        };
        config.validate()?;
        Ok(config)
    }
}
