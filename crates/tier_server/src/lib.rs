//! # Tier Server - Pipeline Stage Orchestrator
//!
//! One [`TierController`] runs per pipeline stage. The same component serves
//! all three stages; only its configuration and its upstream/downstream
//! wiring differ:
//!
//! * **Origin** - ingests raw records, enriches them with zone/arc data and
//!   forwards them to zone-scoped subscribers
//! * **Mid** - receives enriched events from the origin, warms its cache and
//!   redistributes to operators by zone
//! * **Terminal** - serves dashboards and citizen queries through the cached
//!   [`QueryService`] and receives analytics snapshots
//!
//! ## Message Flow
//!
//! 1. A [`RecordSource`] yields a [`TelemetryRecord`]
//! 2. The resolver adds zone, arc and nearest stop (known stops are read
//!    through the cache under [`query::STOPS_KEY`])
//! 3. The enriched event is published on the tier's bus (statistics observer,
//!    cache warmer)
//! 4. The router forwards it to downstream subscribers whose interest matches
//! 5. A [`TierLink`] subscriber queues it for the next tier, which repeats 3-4
//!
//! ## External Collaborators
//!
//! Record sources, stop directories, session authorities and remote
//! endpoints are traits (see [`collaborators`]). Local implementations are
//! provided for running the whole chain in one process.
//!
//! ## Error Handling
//!
//! [`TierError`] is only returned for construction and lifecycle failures and
//! for rejected inputs. Handler, delivery and cache-entry failures are logged
//! and counted where they occur.

// Re-export core types and functions for easy access
pub use collaborators::{
    ChannelSubscriber, Entitlement, JsonLinesRecordSource, MemoryRecordSource, RecordSource,
    SessionAuthority, StaticSessionAuthority, StaticStopDirectory, StopDirectory,
    TelemetryRecord, TierLink,
};
pub use config::TierConfig;
pub use error::TierError;
pub use query::QueryService;
pub use server::{IngestOutcome, IngestSummary, TierController};
pub use utils::{create_tier, create_tier_with_config, link_tiers};

// Public module declarations
pub mod collaborators;
pub mod config;
pub mod error;
pub mod query;
pub mod server;
pub mod utils;
