//! Error types for tier construction and lifecycle.

use transit_event_system::{CacheError, GeoError, RoutingError};

/// Failures surfaced by a [`TierController`](crate::TierController).
///
/// Per-record, per-subscriber and per-entry problems are logged and counted
/// where they happen; only the cases below reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    /// The zone grid could not be built
    #[error("Geo configuration error: {0}")]
    Geo(#[from] GeoError),

    /// Cache storage could not be initialized or persisted
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// A record source or reference-data collaborator failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// The record cannot be enriched (non-finite coordinate, empty source id)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The session token was not accepted
    #[error("Unauthorized")]
    Unauthorized,

    /// The token is valid but entitles none of the requested zones
    #[error("No entitled zones in request")]
    Forbidden,

    #[error("Tier already started")]
    AlreadyStarted,

    #[error("Tier is shutting down")]
    ShuttingDown,
}
