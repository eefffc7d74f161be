//! # Core Type Definitions
//!
//! Fundamental identifiers and geographic value types shared by every tier of
//! the telemetry pipeline.
//!
//! ## Identifier Types
//!
//! - [`ClientId`] / [`SubscriptionId`] - Identity of downstream subscribers
//! - [`ZoneId`] - Grid-cell token such as `Z07`
//! - [`ArcId`] - Synthetic route-segment id built from two stop ids
//!
//! ## Geographic Types
//!
//! - [`Coordinate`] - A latitude/longitude pair in decimal degrees
//! - [`Stop`] - A known stop from the reference-data collaborator
//! - [`GeoBounds`] - The bounding box covered by the zone grid

use compact_str::{format_compact, CompactString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a known stop, as issued by the reference-data repository.
pub type StopId = u64;

/// Unique identifier for a downstream client (dashboard, query client or a
/// downstream tier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Creates a new random client ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier handed back to a remote subscriber when its interest set is
/// registered with a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Grid-cell token produced by the zone resolver.
///
/// Tokens are `Z` followed by the 1-based cell index padded to two digits
/// (`Z01`..`Z40` for a 4x10 grid). Larger grids simply produce wider tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(CompactString);

impl ZoneId {
    /// Wraps an existing token without validation.
    pub fn new(token: impl Into<CompactString>) -> Self {
        Self(token.into())
    }

    /// Builds the token for a 1-based grid cell index.
    pub fn from_index(index: usize) -> Self {
        Self(format_compact!("Z{:02}", index))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Approximate route-segment identifier derived from the two stops nearest to
/// a coordinate.
///
/// Encoded as `min(a, b) * 1_000_000 + max(a, b)`, so the id does not depend on
/// which of the two stops is considered first. Nothing guarantees the
/// coordinate lies on the segment between the stops.
///
/// Only stop ids below [`STOP_MULTIPLIER`](Self::STOP_MULTIPLIER) can be
/// encoded; larger ids would collide with other pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArcId(pub u64);

impl ArcId {
    pub const STOP_MULTIPLIER: u64 = 1_000_000;

    /// Builds the id of the arc between two stops, or `None` if either id is
    /// too large to encode.
    pub fn from_stops(a: StopId, b: StopId) -> Option<Self> {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if high >= Self::STOP_MULTIPLIER {
            return None;
        }
        low.checked_mul(Self::STOP_MULTIPLIER)
            .and_then(|base| base.checked_add(high))
            .map(Self)
    }

    /// Splits the id back into its (lower, higher) stop ids.
    pub fn stops(&self) -> (StopId, StopId) {
        (self.0 / Self::STOP_MULTIPLIER, self.0 % Self::STOP_MULTIPLIER)
    }
}

impl std::fmt::Display for ArcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// A known stop returned by the reference-data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: StopId,
    pub latitude: f64,
    pub longitude: f64,
}

impl Stop {
    pub fn new(stop_id: StopId, latitude: f64, longitude: f64) -> Self {
        Self { stop_id, latitude, longitude }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Geographic bounding box covered by the zone grid.
///
/// # Examples
///
/// ```rust
/// use transit_event_system::GeoBounds;
///
/// let bounds = GeoBounds::default();
/// assert!(bounds.min_latitude < bounds.max_latitude);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Southern boundary
    pub min_latitude: f64,
    /// Northern boundary
    pub max_latitude: f64,
    /// Western boundary
    pub min_longitude: f64,
    /// Eastern boundary
    pub max_longitude: f64,
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self {
            min_latitude: 3.29077,
            max_latitude: 3.49886333,
            min_longitude: -76.58889111,
            max_longitude: -76.46328111,
        }
    }
}

/// Position of a service tier in the enrichment and distribution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TierRole {
    /// Ingests raw records and performs geographic enrichment
    Origin,
    /// Re-distributes enriched events to zone-scoped operators
    Mid,
    /// Serves citizen queries and the system-wide analytics observer
    Terminal,
}

impl std::fmt::Display for TierRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TierRole::Origin => "origin",
            TierRole::Mid => "mid",
            TierRole::Terminal => "terminal",
        };
        f.write_str(name)
    }
}
