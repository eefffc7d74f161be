//! # Geographic Zone Resolution
//!
//! Pure functions that turn a raw coordinate into the geographic context the
//! pipeline distributes:
//!
//! - a **zone** token from a fixed rows x columns grid laid over the service
//!   bounding box ([`GeoZoneResolver::zone_for`]);
//! - the **nearest known stop** by great-circle distance
//!   ([`GeoZoneResolver::nearest_stop`]);
//! - an approximate **arc** id from the two nearest distinct stops
//!   ([`GeoZoneResolver::arc_for`]).
//!
//! Coordinates outside the bounding box are clamped to the nearest edge cell,
//! never rejected. Missing reference data (fewer than two stops) is reported
//! as `None`, which callers treat as "insufficient reference data" and not as
//! an error.
//!
//! The arc id is a heuristic: the coordinate is not checked to lie on the
//! route segment between the two stops.

use crate::types::{ArcId, Coordinate, GeoBounds, Stop, StopId, ZoneId};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula, in metres.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Rejected grid configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("Grid must have at least one row and one column (got {rows}x{columns})")]
    EmptyGrid { rows: usize, columns: usize },
    #[error("Invalid bounding box: {0}")]
    InvalidBounds(String),
}

/// Full geographic context for one coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub zone_id: ZoneId,
    pub arc_id: ArcId,
    pub nearest_stop_id: StopId,
}

/// Great-circle distance between two coordinates, in metres.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Deterministic coordinate → zone/arc resolver over a configured grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoZoneResolver {
    bounds: GeoBounds,
    rows: usize,
    columns: usize,
}

impl GeoZoneResolver {
    /// Creates a resolver for `rows` x `columns` cells over `bounds`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use transit_event_system::{GeoBounds, GeoZoneResolver};
    ///
    /// let resolver = GeoZoneResolver::new(GeoBounds::default(), 4, 10)?;
    /// assert_eq!(resolver.zone_for(3.40, -76.50).as_str(), "Z28");
    /// # Ok::<(), transit_event_system::geo::GeoError>(())
    /// ```
    pub fn new(bounds: GeoBounds, rows: usize, columns: usize) -> Result<Self, GeoError> {
        if rows == 0 || columns == 0 {
            return Err(GeoError::EmptyGrid { rows, columns });
        }
        let finite = [
            bounds.min_latitude,
            bounds.max_latitude,
            bounds.min_longitude,
            bounds.max_longitude,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(GeoError::InvalidBounds("bounds must be finite".to_string()));
        }
        if bounds.min_latitude >= bounds.max_latitude {
            return Err(GeoError::InvalidBounds(
                "min_latitude must be less than max_latitude".to_string(),
            ));
        }
        if bounds.min_longitude >= bounds.max_longitude {
            return Err(GeoError::InvalidBounds(
                "min_longitude must be less than max_longitude".to_string(),
            ));
        }
        Ok(Self { bounds, rows, columns })
    }

    pub fn bounds(&self) -> &GeoBounds {
        &self.bounds
    }

    /// Total number of cells, i.e. the highest zone index.
    pub fn zone_count(&self) -> usize {
        self.rows * self.columns
    }

    /// Whether `zone` is one of the ids [`zone_for`](Self::zone_for) can return.
    pub fn is_known_zone(&self, zone: &ZoneId) -> bool {
        zone.as_str()
            .strip_prefix('Z')
            .and_then(|digits| digits.parse::<usize>().ok())
            .filter(|index| (1..=self.zone_count()).contains(index))
            .is_some_and(|index| ZoneId::from_index(index) == *zone)
    }

    /// Maps a coordinate to its grid cell. Rows follow latitude, columns follow
    /// longitude; cell indices are 1-based, row-major.
    pub fn zone_for(&self, latitude: f64, longitude: f64) -> ZoneId {
        let b = &self.bounds;
        let lat = latitude.clamp(b.min_latitude, b.max_latitude);
        let lon = longitude.clamp(b.min_longitude, b.max_longitude);

        let norm_lat = (lat - b.min_latitude) / (b.max_latitude - b.min_latitude);
        let norm_lon = (lon - b.min_longitude) / (b.max_longitude - b.min_longitude);

        // `as usize` saturates, so NaN lands in cell 0 instead of panicking.
        let row = ((norm_lat * self.rows as f64).floor() as usize).min(self.rows - 1);
        let col = ((norm_lon * self.columns as f64).floor() as usize).min(self.columns - 1);

        ZoneId::from_index(row * self.columns + col + 1)
    }

    /// Closest stop by haversine distance, or `None` when `stops` is empty.
    pub fn nearest_stop<'a>(&self, latitude: f64, longitude: f64, stops: &'a [Stop]) -> Option<&'a Stop> {
        let origin = Coordinate::new(latitude, longitude);
        stops
            .iter()
            .map(|stop| (stop, haversine_distance(origin, stop.coordinate())))
            .fold(None, |best: Option<(&Stop, f64)>, (stop, distance)| match best {
                Some((_, best_distance)) if best_distance <= distance => best,
                _ => Some((stop, distance)),
            })
            .map(|(stop, _)| stop)
    }

    /// Two nearest stops with distinct ids, closest first, found in one pass.
    fn two_nearest<'a>(&self, latitude: f64, longitude: f64, stops: &'a [Stop]) -> Option<(&'a Stop, &'a Stop)> {
        let origin = Coordinate::new(latitude, longitude);
        let mut first: Option<(&Stop, f64)> = None;
        let mut second: Option<(&Stop, f64)> = None;

        for stop in stops {
            let distance = haversine_distance(origin, stop.coordinate());
            match first {
                None => first = Some((stop, distance)),
                Some((best, best_distance)) => {
                    if stop.stop_id == best.stop_id {
                        if distance < best_distance {
                            first = Some((stop, distance));
                        }
                        continue;
                    }
                    if distance < best_distance {
                        second = first;
                        first = Some((stop, distance));
                    } else if second.map_or(true, |(_, d)| distance < d) {
                        second = Some((stop, distance));
                    }
                }
            }
        }

        match (first, second) {
            (Some((a, _)), Some((b, _))) => Some((a, b)),
            _ => None,
        }
    }

    /// Approximate arc id from the two nearest distinct stops, or `None` with
    /// fewer than two stops or when their ids cannot be encoded.
    pub fn arc_for(&self, latitude: f64, longitude: f64, stops: &[Stop]) -> Option<ArcId> {
        self.two_nearest(latitude, longitude, stops)
            .and_then(|(a, b)| ArcId::from_stops(a.stop_id, b.stop_id))
    }

    /// Zone, arc and nearest stop together. `None` whenever an arc cannot be
    /// built (fewer than two distinct stops, or stop ids out of the encodable
    /// range); callers fall back to
    /// [`zone_for`](Self::zone_for) for zone-only enrichment.
    pub fn resolve(&self, latitude: f64, longitude: f64, stops: &[Stop]) -> Option<Resolution> {
        let (nearest, other) = self.two_nearest(latitude, longitude, stops)?;
        Some(Resolution {
            zone_id: self.zone_for(latitude, longitude),
            arc_id: ArcId::from_stops(nearest.stop_id, other.stop_id)?,
            nearest_stop_id: nearest.stop_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cali_resolver() -> GeoZoneResolver {
        GeoZoneResolver::new(GeoBounds::default(), 4, 10).expect("valid grid")
    }

    fn stops() -> Vec<Stop> {
        vec![
            Stop::new(500_101, 3.4500, -76.5300),
            Stop::new(500_007, 3.4010, -76.5010),
            Stop::new(500_300, 3.3000, -76.4700),
            Stop::new(500_042, 3.3990, -76.4985),
        ]
    }

    #[test]
    fn test_reference_coordinate_maps_to_z28() {
        let resolver = cali_resolver();
        assert_eq!(resolver.zone_for(3.40, -76.50).as_str(), "Z28");
        for _ in 0..10 {
            assert_eq!(resolver.zone_for(3.40, -76.50), resolver.zone_for(3.40, -76.50));
        }
    }

    #[test]
    fn test_corners_and_edges() {
        let resolver = cali_resolver();
        let b = *resolver.bounds();
        assert_eq!(resolver.zone_for(b.min_latitude, b.min_longitude).as_str(), "Z01");
        assert_eq!(resolver.zone_for(b.max_latitude, b.max_longitude).as_str(), "Z40");
        assert_eq!(resolver.zone_for(b.min_latitude, b.max_longitude).as_str(), "Z10");
        assert_eq!(resolver.zone_for(b.max_latitude, b.min_longitude).as_str(), "Z31");
    }

    #[test]
    fn test_out_of_bounds_clamps_to_edge() {
        let resolver = cali_resolver();
        let b = *resolver.bounds();
        assert_eq!(
            resolver.zone_for(b.max_latitude + 5.0, -76.50),
            resolver.zone_for(b.max_latitude, -76.50)
        );
        assert_eq!(
            resolver.zone_for(3.40, b.min_longitude - 1.0),
            resolver.zone_for(3.40, b.min_longitude)
        );
        assert_eq!(
            resolver.zone_for(-90.0, 180.0),
            resolver.zone_for(b.min_latitude, b.max_longitude)
        );
    }

    #[test]
    fn test_non_finite_input_does_not_panic() {
        let resolver = cali_resolver();
        let zone = resolver.zone_for(f64::NAN, f64::INFINITY);
        assert!(zone.as_str().starts_with('Z'));
    }

    #[test]
    fn test_invalid_grid_is_rejected() {
        assert!(matches!(
            GeoZoneResolver::new(GeoBounds::default(), 0, 10),
            Err(GeoError::EmptyGrid { .. })
        ));
        let mut inverted = GeoBounds::default();
        std::mem::swap(&mut inverted.min_latitude, &mut inverted.max_latitude);
        assert!(matches!(
            GeoZoneResolver::new(inverted, 4, 10),
            Err(GeoError::InvalidBounds(_))
        ));
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is ~111.19 km on a 6371 km sphere.
        let d = haversine_distance(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
        assert_eq!(haversine_distance(Coordinate::new(3.4, -76.5), Coordinate::new(3.4, -76.5)), 0.0);
    }

    #[test]
    fn test_nearest_stop() {
        let resolver = cali_resolver();
        let stops = stops();
        let nearest = resolver.nearest_stop(3.4011, -76.5011, &stops).expect("stop");
        assert_eq!(nearest.stop_id, 500_007);
        assert!(resolver.nearest_stop(3.4, -76.5, &[]).is_none());
    }

    #[test]
    fn test_arc_uses_two_nearest_and_is_symmetric() {
        let resolver = cali_resolver();
        let stops = stops();
        let arc = resolver.arc_for(3.40, -76.50, &stops).expect("arc");
        assert_eq!(arc, ArcId(500_007 * 1_000_000 + 500_042));
        assert_eq!(arc.stops(), (500_007, 500_042));

        let mut reversed = stops.clone();
        reversed.reverse();
        assert_eq!(resolver.arc_for(3.40, -76.50, &reversed), Some(arc));
        assert_eq!(ArcId::from_stops(500_042, 500_007), ArcId::from_stops(500_007, 500_042));
    }

    #[test]
    fn test_arc_skips_duplicate_stop_ids() {
        let resolver = cali_resolver();
        let stops = vec![
            Stop::new(7, 3.4000, -76.5000),
            Stop::new(7, 3.4001, -76.5001),
            Stop::new(9, 3.4500, -76.5300),
        ];
        assert_eq!(resolver.arc_for(3.40, -76.50, &stops), ArcId::from_stops(7, 9));

        let same = vec![Stop::new(7, 3.40, -76.50), Stop::new(7, 3.41, -76.51)];
        assert!(resolver.arc_for(3.40, -76.50, &same).is_none());
    }

    #[test]
    fn test_unencodable_stop_ids_yield_no_arc() {
        let resolver = cali_resolver();
        let stops = vec![
            Stop::new(20_000_000_000_000, 3.4000, -76.5000),
            Stop::new(20_000_000_000_001, 3.4010, -76.5010),
        ];
        assert!(resolver.arc_for(3.40, -76.50, &stops).is_none());
        assert!(resolver.resolve(3.40, -76.50, &stops).is_none());
        assert_eq!(
            resolver.nearest_stop(3.40, -76.50, &stops).map(|s| s.stop_id),
            Some(20_000_000_000_000)
        );
    }

    #[test]
    fn test_known_zones() {
        let resolver = cali_resolver();
        assert!(resolver.is_known_zone(&ZoneId::from_index(1)));
        assert!(resolver.is_known_zone(&ZoneId::from_index(40)));
        assert!(resolver.is_known_zone(&resolver.zone_for(3.40, -76.50)));
        assert!(!resolver.is_known_zone(&ZoneId::from_index(41)));
        assert!(!resolver.is_known_zone(&ZoneId::from_index(0)));
        assert!(!resolver.is_known_zone(&ZoneId::new("Z1")));
        assert!(!resolver.is_known_zone(&ZoneId::new("bogus")));
        assert!(!resolver.is_known_zone(&ZoneId::new("Z+01")));
    }

    #[test]
    fn test_insufficient_reference_data() {
        let resolver = cali_resolver();
        let one = vec![Stop::new(1, 3.40, -76.50)];
        assert!(resolver.arc_for(3.40, -76.50, &[]).is_none());
        assert!(resolver.arc_for(3.40, -76.50, &one).is_none());
        assert!(resolver.resolve(3.40, -76.50, &[]).is_none());
        assert!(resolver.resolve(3.40, -76.50, &one).is_none());
    }

    #[test]
    fn test_resolve_composes_parts() {
        let resolver = cali_resolver();
        let stops = stops();
        let resolution = resolver.resolve(3.40, -76.50, &stops).expect("resolution");
        assert_eq!(resolution.zone_id, resolver.zone_for(3.40, -76.50));
        assert_eq!(Some(resolution.arc_id), resolver.arc_for(3.40, -76.50, &stops));
        assert_eq!(
            Some(resolution.nearest_stop_id),
            resolver.nearest_stop(3.40, -76.50, &stops).map(|s| s.stop_id)
        );
    }
}
