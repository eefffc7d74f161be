//! Tier configuration types and defaults.
//!
//! A [`TierConfig`] carries everything one tier needs to assemble its
//! resolver, cache and router. The binary builds it from the TOML file; tests
//! build it directly.

use std::path::PathBuf;
use std::time::Duration;
use transit_event_system::{CacheConfig, GeoBounds, RouterConfig, TierRole};

/// Configuration for one pipeline tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierConfig {
    /// Position of this tier in the chain
    pub role: TierRole,

    /// Bounding box covered by the zone grid
    pub bounds: GeoBounds,

    /// Grid rows (latitude bands)
    pub grid_rows: usize,

    /// Grid columns (longitude bands)
    pub grid_columns: usize,

    /// Maximum age of a cache entry
    pub cache_ttl: Duration,

    /// Snapshot file for this tier's cache; `None` keeps the cache in memory only
    pub snapshot_path: Option<PathBuf>,

    /// Upper bound for a single downstream delivery
    pub delivery_timeout: Duration,

    /// Consecutive failed deliveries before a subscriber is dropped
    pub max_consecutive_failures: u32,

    /// Queue depth of channel-backed downstream clients
    pub subscriber_queue_capacity: usize,
}

impl TierConfig {
    /// Default configuration for `role`.
    pub fn for_role(role: TierRole) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.cache_ttl,
            snapshot_path: self.snapshot_path.clone(),
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            delivery_timeout: self.delivery_timeout,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    /// Whether this tier keeps the latest position of every vehicle in its
    /// cache. The origin tier only enriches and forwards.
    pub fn warms_vehicle_cache(&self) -> bool {
        !matches!(self.role, TierRole::Origin)
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            role: TierRole::Origin,
            bounds: GeoBounds::default(),
            grid_rows: 4,
            grid_columns: 10,
            cache_ttl: Duration::from_secs(600),
            snapshot_path: None,
            delivery_timeout: Duration::from_millis(500),
            max_consecutive_failures: 1,
            subscriber_queue_capacity: 1024,
        }
    }
}
