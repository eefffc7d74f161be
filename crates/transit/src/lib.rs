//! # Transit - Telemetry Pipeline Entry Point
//!
//! Runs the origin, mid and terminal tiers of the vehicle telemetry pipeline
//! in one process. This crate handles CLI parsing, configuration loading,
//! logging setup and the application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (written to transit.toml if missing)
//! transit
//!
//! # Replay a record file against a stop reference file
//! transit --records feed.jsonl --stops stops.json
//!
//! # Persist caches between runs, JSON logs for production
//! transit --snapshot /var/lib/transit --json-logs
//! ```
//!
//! ## Signal Handling
//!
//! SIGINT/SIGTERM stop record intake, stop every tier and save its cache
//! snapshot. A second signal exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Parses arguments, sets up logging and runs the pipeline until shutdown.
///
/// Exits the process with status 1 on startup or runtime failure.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file, before CLI overrides are applied
    let mut logging = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default()
        .logging;
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{
    CacheSettings, GeoSettings, IngestSettings, LoggingSettings, MonitoringSettings,
    RoutingSettings,
};
