//! Configuration management for the transit pipeline.
//!
//! This module handles loading, validation, and conversion of the pipeline
//! configuration from TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tier_server::TierConfig;
use tracing::info;
use transit_event_system::{GeoBounds, TierRole};

fn default_grid_rows() -> usize {
    4
}
fn default_grid_columns() -> usize {
    10
}
fn default_ttl_secs() -> u64 {
    600
}
fn default_snapshot_path() -> String {
    "snapshots".to_string()
}
fn default_delivery_timeout_ms() -> u64 {
    500
}
fn default_max_consecutive_failures() -> u32 {
    1
}
fn default_subscriber_queue_capacity() -> usize {
    1024
}
fn default_stats_interval_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
///
/// Every section may be omitted; missing sections and fields take their
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub geo: GeoSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub routing: RoutingSettings,
    #[serde(default)]
    pub ingest: IngestSettings,
    #[serde(default)]
    pub monitoring: MonitoringSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Area covered by the zone grid and the grid dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoSettings {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
    /// Latitude bands
    #[serde(default = "default_grid_rows")]
    pub rows: usize,
    /// Longitude bands
    #[serde(default = "default_grid_columns")]
    pub columns: usize,
}

/// Cache expiry and snapshot persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entry time-to-live in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Directory holding one `<tier>-cache.json` snapshot per tier
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default)]
    pub enable_persistence: bool,
}

/// Downstream delivery behaviour, shared by all tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Failed deliveries in a row after which a subscriber is dropped
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Queue depth of in-process dashboard subscribers
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
}

/// Where raw records and reference stops come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSettings {
    /// JSON-lines record file; without one the pipeline idles until shutdown
    #[serde(default)]
    pub records_path: Option<String>,
    /// JSON array of known stops; without one enrichment is zone-only
    #[serde(default)]
    pub stops_path: Option<String>,
    /// Pause between replayed records (0 replays as fast as possible)
    #[serde(default)]
    pub replay_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for GeoSettings {
    fn default() -> Self {
        let bounds = GeoBounds::default();
        Self {
            min_latitude: bounds.min_latitude,
            max_latitude: bounds.max_latitude,
            min_longitude: bounds.min_longitude,
            max_longitude: bounds.max_longitude,
            rows: default_grid_rows(),
            columns: default_grid_columns(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            snapshot_path: default_snapshot_path(),
            enable_persistence: false,
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, writing a default file there first if
    /// none exists.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn bounds(&self) -> GeoBounds {
        GeoBounds {
            min_latitude: self.geo.min_latitude,
            max_latitude: self.geo.max_latitude,
            min_longitude: self.geo.min_longitude,
            max_longitude: self.geo.max_longitude,
        }
    }

    /// Snapshot file of `role`, if persistence is enabled.
    pub fn snapshot_file(&self, role: TierRole) -> Option<PathBuf> {
        self.cache
            .enable_persistence
            .then(|| Path::new(&self.cache.snapshot_path).join(format!("{role}-cache.json")))
    }

    pub fn replay_interval(&self) -> Option<Duration> {
        match self.ingest.replay_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring.stats_interval_secs)
    }

    /// Tier configuration for `role`.
    pub fn to_tier_config(&self, role: TierRole) -> TierConfig {
        TierConfig {
            role,
            bounds: self.bounds(),
            grid_rows: self.geo.rows,
            grid_columns: self.geo.columns,
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            snapshot_path: self.snapshot_file(role),
            delivery_timeout: Duration::from_millis(self.routing.delivery_timeout_ms),
            max_consecutive_failures: self.routing.max_consecutive_failures,
            subscriber_queue_capacity: self.routing.subscriber_queue_capacity,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let geo = &self.geo;
        let finite = [geo.min_latitude, geo.max_latitude, geo.min_longitude, geo.max_longitude]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err("Geo bounds must be finite".to_string());
        }
        if geo.min_latitude >= geo.max_latitude {
            return Err("geo.min_latitude must be less than geo.max_latitude".to_string());
        }
        if geo.min_longitude >= geo.max_longitude {
            return Err("geo.min_longitude must be less than geo.max_longitude".to_string());
        }
        if geo.rows == 0 || geo.columns == 0 {
            return Err(format!("Grid must have at least one cell, got {}x{}", geo.rows, geo.columns));
        }

        if self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs must be greater than 0".to_string());
        }
        if self.cache.enable_persistence && self.cache.snapshot_path.trim().is_empty() {
            return Err("cache.snapshot_path cannot be empty when persistence is enabled".to_string());
        }

        if self.routing.delivery_timeout_ms == 0 {
            return Err("routing.delivery_timeout_ms must be greater than 0".to_string());
        }
        if self.routing.max_consecutive_failures == 0 {
            return Err("routing.max_consecutive_failures must be greater than 0".to_string());
        }
        if self.routing.subscriber_queue_capacity == 0 {
            return Err("routing.subscriber_queue_capacity must be greater than 0".to_string());
        }

        if self.monitoring.stats_interval_secs == 0 {
            return Err("monitoring.stats_interval_secs must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!((config.geo.rows, config.geo.columns), (4, 10));
        assert_eq!(config.cache.ttl_secs, 600);
        assert!(!config.cache.enable_persistence);
        assert_eq!(config.routing.delivery_timeout_ms, 500);
        assert_eq!(config.routing.max_consecutive_failures, 1);
        assert_eq!(config.monitoring.stats_interval_secs, 60);
        assert_eq!(config.logging.level, "info");
        assert!(config.replay_interval().is_none());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_writes_default() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("transit.toml");

        let config = AppConfig::load_from_file(&path).await.expect("default config");
        assert!(path.exists());
        assert_eq!(config.cache.ttl_secs, 600);

        let reloaded = AppConfig::load_from_file(&path).await.expect("written config parses");
        assert_eq!(reloaded.geo.rows, config.geo.rows);
    }

    #[tokio::test]
    async fn test_partial_file_takes_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("transit.toml");
        tokio::fs::write(
            &path,
            r#"
[cache]
ttl_secs = 30
enable_persistence = true
snapshot_path = "/tmp/transit"

[ingest]
records_path = "feed.jsonl"
replay_interval_ms = 250

[logging]
level = "debug"
"#,
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(&path).await.expect("parse");
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.geo.columns, 10);
        assert_eq!(config.routing.subscriber_queue_capacity, 1024);
        assert_eq!(config.ingest.records_path.as_deref(), Some("feed.jsonl"));
        assert_eq!(config.replay_interval(), Some(Duration::from_millis(250)));
        assert_eq!(config.logging.level, "debug");
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "[cache\nttl_secs = ").await.unwrap();
        assert!(AppConfig::load_from_file(&path).await.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.geo.min_latitude = config.geo.max_latitude;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.geo.rows = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.routing.delivery_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_tier_config() {
        let mut config = AppConfig::default();
        config.cache.ttl_secs = 90;
        config.routing.delivery_timeout_ms = 200;

        let origin = config.to_tier_config(TierRole::Origin);
        assert_eq!(origin.role, TierRole::Origin);
        assert_eq!(origin.cache_ttl, Duration::from_secs(90));
        assert_eq!(origin.delivery_timeout, Duration::from_millis(200));
        assert!(origin.snapshot_path.is_none());

        config.cache.enable_persistence = true;
        config.cache.snapshot_path = "state".to_string();
        let terminal = config.to_tier_config(TierRole::Terminal);
        assert_eq!(terminal.snapshot_path, Some(PathBuf::from("state/terminal-cache.json")));
    }
}
