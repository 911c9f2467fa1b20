//! Command-line interface handling for the game server.
//!
//! Every option except `--config` overrides the matching configuration file
//! value.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the bind address and port
    pub bind_address: Option<SocketAddr>,
    /// Optional override for the number of I/O worker threads
    pub threads: Option<usize>,
    /// Optional override for the number of worlds
    pub worlds: Option<usize>,
    /// Optional override for the tick rate
    pub tick_rate: Option<u32>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            bind_address: matches.get_one::<SocketAddr>("bind").copied(),
            threads: matches.get_one::<usize>("threads").copied(),
            worlds: matches.get_one::<usize>("worlds").copied(),
            tick_rate: matches.get_one::<u32>("tick-rate").copied(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Real-time multiplayer game server")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (.toml or .json)")
                .value_parser(value_parser!(PathBuf))
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Bind address (e.g., 127.0.0.1:8080)")
                .value_parser(value_parser!(SocketAddr)),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("N")
                .help("I/O worker threads (0 = one per CPU core)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("worlds")
                .short('w')
                .long("worlds")
                .value_name("N")
                .help("Number of simulation worlds")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("tick-rate")
                .long("tick-rate")
                .value_name("HZ")
                .help("World ticks per second")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(ArgAction::SetTrue),
        )
}
