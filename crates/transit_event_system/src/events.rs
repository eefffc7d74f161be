//! # Event Traits and Pipeline Events
//!
//! This module defines the closed set of events that travel through the
//! pipeline, the [`Event`] trait that lets handlers be registered for one
//! concrete event type, and the handler abstractions the [`EventBus`] invokes.
//!
//! ## Event Categories
//!
//! - [`EnrichedEvent`] - A telemetry record after geographic enrichment
//! - [`AnalyticsSnapshot`] - Point-in-time counters for the analytics observer
//! - [`QueryResult`] - The outcome of a read-through cache query
//!
//! Every event is wrapped in [`BusEvent`] when published, and the bus dispatches
//! on [`EventKind`] only. There is no supertype matching: a handler registered
//! for enriched events never sees analytics snapshots.
//!
//! [`EventBus`]: crate::system::EventBus

use crate::analytics::StatSnapshot;
use crate::cache::CachedValue;
use crate::types::{ArcId, Coordinate, StopId, TierRole, ZoneId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

// ============================================================================
// Pipeline Events
// ============================================================================

/// A telemetry record after the resolver step.
///
/// Enriched events are immutable once built. Delivery hands each consumer its
/// own copy; nothing downstream mutates a shared instance.
///
/// # Examples
///
/// ```rust
/// use transit_event_system::{EnrichedEvent, Coordinate, ZoneId};
///
/// let event = EnrichedEvent {
///     source_id: "bus-1042".to_string(),
///     line_id: "T31".to_string(),
///     coordinate: Coordinate::new(3.40, -76.50),
///     zone_id: ZoneId::from_index(28),
///     arc_id: None,
///     nearest_stop_id: None,
///     event_timestamp: 1_700_000_000_000,
///     sequence_id: 7,
/// };
/// assert_eq!(event.zone_id.as_str(), "Z28");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    /// Vehicle or device that produced the record
    pub source_id: String,
    /// Route/line the vehicle was operating on
    pub line_id: String,
    /// Reported position
    pub coordinate: Coordinate,
    /// Grid cell containing the (clamped) position
    pub zone_id: ZoneId,
    /// Approximate route segment, absent when fewer than two stops are known
    pub arc_id: Option<ArcId>,
    /// Closest known stop, absent when no stops are known
    pub nearest_stop_id: Option<StopId>,
    /// Time the record was produced, Unix epoch milliseconds
    pub event_timestamp: u64,
    /// Datagram/sequence number, monotonic per source
    pub sequence_id: u64,
}

/// Point-in-time statistics of one tier, published for the system-wide
/// analytics observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    /// Tier that produced the snapshot
    pub tier: TierRole,
    /// Unix epoch milliseconds at which the counters were read
    pub taken_at: u64,
    /// Global counters
    pub system: StatSnapshot,
    /// Per-zone counters for every zone observed so far
    pub zones: BTreeMap<ZoneId, StatSnapshot>,
}

/// Outcome of a read-through query against a tier's cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Cache key that was queried
    pub key: String,
    /// Resolved value, `None` when the answer is unavailable
    pub value: Option<CachedValue>,
    /// Whether the value came from the cache
    pub cache_hit: bool,
    /// Time spent answering, in microseconds
    pub latency_micros: u64,
}

/// Discriminant used as the bus registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Enriched,
    Analytics,
    QueryResult,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Enriched => "enriched",
            EventKind::Analytics => "analytics",
            EventKind::QueryResult => "query_result",
        };
        f.write_str(name)
    }
}

/// The closed set of events carried by the bus and across tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum BusEvent {
    Enriched(EnrichedEvent),
    Analytics(AnalyticsSnapshot),
    QueryResult(QueryResult),
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::Enriched(_) => EventKind::Enriched,
            BusEvent::Analytics(_) => EventKind::Analytics,
            BusEvent::QueryResult(_) => EventKind::QueryResult,
        }
    }

    /// Zone this event is scoped to, if any. Events without a zone are routed
    /// to every downstream subscriber.
    pub fn zone(&self) -> Option<&ZoneId> {
        match self {
            BusEvent::Enriched(event) => Some(&event.zone_id),
            BusEvent::Analytics(_) | BusEvent::QueryResult(_) => None,
        }
    }
}

// ============================================================================
// Event Traits and Handler Infrastructure
// ============================================================================

/// Implemented by every concrete event type that can travel on the bus.
///
/// The trait ties a Rust type to its [`EventKind`] so handlers can be
/// registered against a concrete type and receive it without runtime casts.
pub trait Event: Clone + Send + Sync + Debug + 'static {
    /// Registry key for this event type.
    fn kind() -> EventKind
    where
        Self: Sized;

    /// Wraps the event for publication.
    fn into_bus(self) -> BusEvent;

    /// Borrows the concrete event back out of a bus envelope.
    fn from_bus(event: &BusEvent) -> Option<&Self>
    where
        Self: Sized;
}

macro_rules! impl_event {
    ($ty:ty, $variant:ident) => {
        impl Event for $ty {
            fn kind() -> EventKind {
                EventKind::$variant
            }

            fn into_bus(self) -> BusEvent {
                BusEvent::$variant(self)
            }

            fn from_bus(event: &BusEvent) -> Option<&Self> {
                match event {
                    BusEvent::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for BusEvent {
            fn from(event: $ty) -> Self {
                BusEvent::$variant(event)
            }
        }
    };
}

impl_event!(EnrichedEvent, Enriched);
impl_event!(AnalyticsSnapshot, Analytics);
impl_event!(QueryResult, QueryResult);

/// Handler trait for processing bus events asynchronously.
///
/// Most users will not implement this trait directly, but instead register a
/// closure through [`EventBus::on`] which wraps it in a [`TypedEventHandler`].
///
/// [`EventBus::on`]: crate::system::EventBus::on
#[async_trait]
pub trait EventHandler: Send + Sync + 'static + Debug {
    /// Handles one published event.
    async fn handle(&self, event: &BusEvent) -> Result<(), EventError>;

    /// The event kind this handler expects.
    fn event_kind(&self) -> EventKind;

    /// Human-readable name for logs.
    fn handler_name(&self) -> &str;
}

/// Type-safe wrapper that adapts a closure over a concrete event type to the
/// [`EventHandler`] trait.
pub struct TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    handler: F,
    name: String,
    _phantom: std::marker::PhantomData<fn(T)>,
}

impl<T, F> std::fmt::Debug for TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedEventHandler")
            .field("name", &self.name)
            .field("kind", &T::kind())
            .finish()
    }
}

impl<T, F> TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            handler,
            name: name.into(),
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> EventHandler for TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
{
    async fn handle(&self, event: &BusEvent) -> Result<(), EventError> {
        match T::from_bus(event) {
            Some(typed) => (self.handler)(typed.clone()),
            None => {
                tracing::warn!(
                    "🟡 EventHandler '{}' expects '{}' but was given '{}'; skipping",
                    self.name,
                    T::kind(),
                    event.kind()
                );
                Ok(())
            }
        }
    }

    fn event_kind(&self) -> EventKind {
        T::kind()
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Errors raised by event handlers and the bus.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Handler execution failed during event processing
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
    /// Handler panicked while processing an event
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),
    /// Event could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("An unexpected error occurred: {0}")]
    Other(String),
}
