//! Command-line interface handling for the transit pipeline.
//!
//! Every option except `--config` overrides a value from the configuration
//! file.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the JSON-lines record file
    pub records_path: Option<PathBuf>,
    /// Optional override for the stop reference file
    pub stops_path: Option<PathBuf>,
    /// Optional override for the snapshot directory (enables persistence)
    pub snapshot_path: Option<PathBuf>,
}

impl CliArgs {
    /// Parses the process arguments. Exits with usage on invalid input.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("transit.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            records_path: matches.get_one::<String>("records").map(PathBuf::from),
            stops_path: matches.get_one::<String>("stops").map(PathBuf::from),
            snapshot_path: matches.get_one::<String>("snapshot").map(PathBuf::from),
        }
    }
}

fn command() -> Command {
    Command::new("Transit Telemetry Pipeline")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Three-tier vehicle telemetry enrichment, distribution and caching")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("transit.toml"),
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
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("records")
                .short('r')
                .long("records")
                .value_name("FILE")
                .help("JSON-lines file of raw telemetry records to replay"),
        )
        .arg(
            Arg::new("stops")
                .short('s')
                .long("stops")
                .value_name("FILE")
                .help("JSON array of known stops"),
        )
        .arg(
            Arg::new("snapshot")
                .long("snapshot")
                .value_name("DIR")
                .help("Directory for per-tier cache snapshots"),
        )
}
