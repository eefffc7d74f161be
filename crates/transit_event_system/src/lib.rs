//! # Transit Event System
//!
//! The enrichment, distribution and caching core of a three-tier vehicle
//! telemetry pipeline.
//!
//! ## Core Features
//!
//! - **Geographic enrichment**: [`GeoZoneResolver`] maps a coordinate to a grid
//!   zone token and an approximate route-segment (arc) id
//! - **Typed event bus**: [`EventBus`] dispatches a closed set of events to
//!   handlers registered for their exact kind, isolating handler failures
//! - **Multi-hop routing**: [`EventRouter`] fans events out to downstream
//!   subscribers filtered by zone interest, and chains tiers together
//! - **TTL caching**: [`CacheManager`] with lazy expiry and atomic, versioned
//!   on-disk snapshots
//! - **Statistics**: [`StatisticsCollector`] keeps lock-free global and
//!   per-zone counters
//!
//! ## Data Flow
//!
//! ```text
//! raw record ─▶ GeoZoneResolver ─▶ EnrichedEvent ─▶ EventBus (cache warmers, stats)
//!                                          │
//!                                          └─▶ EventRouter ─▶ next tier ─▶ ... ─▶ dashboards
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use transit_event_system::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = GeoZoneResolver::new(GeoBounds::default(), 4, 10)?;
//!     let bus = create_event_bus();
//!
//!     bus.on("printer", |event: EnrichedEvent| {
//!         println!("{} is in {}", event.source_id, event.zone_id);
//!         Ok(())
//!     })
//!     .await;
//!
//!     let zone_id = resolver.zone_for(3.40, -76.50);
//!     let delivered = bus
//!         .publish(EnrichedEvent {
//!             source_id: "bus-1042".to_string(),
//!             line_id: "T31".to_string(),
//!             coordinate: Coordinate::new(3.40, -76.50),
//!             zone_id,
//!             arc_id: None,
//!             nearest_stop_id: None,
//!             event_timestamp: current_timestamp_millis(),
//!             sequence_id: 1,
//!         })
//!         .await;
//!     assert_eq!(delivered, 1);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod analytics;
pub mod cache;
pub mod clock;
pub mod events;
pub mod geo;
pub mod monitoring;
pub mod routing;
pub mod shutdown;
pub mod system;
pub mod types;
pub mod utils;

// Re-export commonly used items for convenience
pub use analytics::{StatCounter, StatSnapshot, StatisticsCollector};
pub use cache::{
    CacheConfig, CacheError, CacheLookup, CacheManager, CacheStats, CacheValue, CachedValue,
    RestoreReport,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{
    AnalyticsSnapshot, BusEvent, EnrichedEvent, Event, EventError, EventHandler, EventKind,
    QueryResult, TypedEventHandler,
};
pub use geo::{haversine_distance, GeoError, GeoZoneResolver, Resolution};
pub use monitoring::{PipelineMonitor, TierReport};
pub use routing::{
    DeliveryError, DeliveryReport, EventRouter, Interest, RemoteSubscriber, RouterConfig,
    RouterState, RouterStats, RoutingError, SubscriptionManager,
};
pub use shutdown::ShutdownState;
pub use system::{EventBus, EventBusStats, HandlerId};
pub use types::*;
pub use utils::{create_event_bus, current_timestamp, current_timestamp_millis};

// External dependencies that collaborator implementations commonly need
pub use async_trait::async_trait;
pub use std::sync::Arc;
