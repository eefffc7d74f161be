//! Read-through query surface consumed by dashboards and citizen clients.
//!
//! Every answer goes through the tier's cache and is timed; the latency and
//! the hit/miss outcome are recorded globally and, for zone-scoped answers,
//! against the zone. The outcome is also published on the bus as a
//! [`QueryResult`] so local observers see query traffic.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;
use transit_event_system::{
    CacheManager, CachedValue, EventBus, GeoZoneResolver, QueryResult, StatSnapshot,
    StatisticsCollector, ZoneId,
};

/// Cache key of the known-stop list.
pub const STOPS_KEY: &str = "stops:known";

/// Cache key of the latest position of `source_id`.
pub fn vehicle_key(source_id: &str) -> String {
    format!("vehicle:{source_id}")
}

/// Cache key of cached counters for `zone`.
pub fn zone_key(zone: &ZoneId) -> String {
    format!("zone:{zone}")
}

/// Handle on one tier's cache, statistics and bus. Cheap to clone.
///
/// Only zones of `resolver`'s grid get their own counters.
#[derive(Debug, Clone)]
pub struct QueryService {
    cache: Arc<CacheManager<CachedValue>>,
    statistics: Arc<StatisticsCollector>,
    bus: Arc<EventBus>,
    resolver: GeoZoneResolver,
}

impl QueryService {
    pub fn new(
        cache: Arc<CacheManager<CachedValue>>,
        statistics: Arc<StatisticsCollector>,
        bus: Arc<EventBus>,
        resolver: GeoZoneResolver,
    ) -> Self {
        Self {
            cache,
            statistics,
            bus,
            resolver,
        }
    }

    /// Serves `key` from the cache, or runs `resolve` on a miss and caches a
    /// found value. An unavailable answer yields `value: None`, never an error.
    pub async fn get_cached_or_resolve<F, Fut>(&self, key: &str, resolve: F) -> QueryResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<CachedValue>>,
    {
        let started = Instant::now();
        let lookup = self.cache.get_or_resolve(key, resolve).await;
        let elapsed = started.elapsed();

        let zone = zone_scope(key, lookup.value.as_ref()).filter(|zone| self.resolver.is_known_zone(zone));
        if lookup.hit {
            self.statistics.record_hit(zone.as_ref(), elapsed);
        } else {
            self.statistics.record_miss(zone.as_ref(), elapsed);
        }
        trace!("Query '{}' hit={} in {:?}", key, lookup.hit, elapsed);

        let result = QueryResult {
            key: key.to_string(),
            value: lookup.value,
            cache_hit: lookup.hit,
            latency_micros: elapsed.as_micros() as u64,
        };
        self.bus.publish(result.clone()).await;
        result
    }

    /// Latest known position of a vehicle. Positions are only ever filled in by
    /// the cache warmer, so a miss means "not seen within the TTL".
    pub async fn get_vehicle_position(&self, source_id: &str) -> QueryResult {
        self.get_cached_or_resolve(&vehicle_key(source_id), || async { None })
            .await
    }

    /// Counters for one zone, `None` if the zone has seen no traffic.
    pub fn get_zone_statistics(&self, zone: &ZoneId) -> Option<StatSnapshot> {
        self.statistics.existing_zone(zone).map(|counter| counter.snapshot())
    }

    pub fn get_system_statistics(&self) -> StatSnapshot {
        self.statistics.global().snapshot()
    }
}

/// Zone a query claims: the `zone:<id>` key prefix, otherwise the zone of a
/// returned vehicle position. Callers check it against the grid.
fn zone_scope(key: &str, value: Option<&CachedValue>) -> Option<ZoneId> {
    if let Some(zone) = key.strip_prefix("zone:") {
        return Some(ZoneId::from(zone));
    }
    match value {
        Some(CachedValue::VehiclePosition(event)) => Some(event.zone_id.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use transit_event_system::{
        create_event_bus, CacheConfig, Coordinate, EnrichedEvent, GeoBounds, ManualClock,
    };

    fn service() -> (QueryService, Arc<CacheManager<CachedValue>>) {
        let cache = Arc::new(
            CacheManager::new(CacheConfig::default(), Arc::new(ManualClock::new(0))).expect("cache"),
        );
        let resolver = GeoZoneResolver::new(GeoBounds::default(), 4, 10).expect("grid");
        let service = QueryService::new(
            cache.clone(),
            Arc::new(StatisticsCollector::new()),
            create_event_bus(),
            resolver,
        );
        (service, cache)
    }

    fn position(zone: &str) -> CachedValue {
        CachedValue::VehiclePosition(EnrichedEvent {
            source_id: "bus-12".to_string(),
            line_id: "P47".to_string(),
            coordinate: Coordinate::new(3.44, -76.52),
            zone_id: ZoneId::from(zone),
            arc_id: None,
            nearest_stop_id: None,
            event_timestamp: 0,
            sequence_id: 1,
        })
    }

    #[tokio::test]
    async fn test_fresh_service_statistics_are_zero() {
        let (service, _) = service();
        let system = service.get_system_statistics();
        assert_eq!(system.hit_rate, 0.0);
        assert_eq!(system.avg_response_time_ms, 0.0);
        assert!(service.get_zone_statistics(&ZoneId::from("Z01")).is_none());
    }

    #[tokio::test]
    async fn test_miss_then_hit_is_recorded_per_zone() {
        let (service, _) = service();
        let resolutions = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = resolutions.clone();
            service
                .get_cached_or_resolve("vehicle:bus-12", || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Some(position("Z14"))
                })
                .await;
        }

        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
        let system = service.get_system_statistics();
        assert_eq!((system.total_requests, system.cache_hits, system.cache_misses), (2, 1, 1));
        assert_eq!(system.hit_rate, 0.5);

        let zone = service.get_zone_statistics(&ZoneId::from("Z14")).expect("zone counters");
        assert_eq!(zone.total_requests, 2);
    }

    #[tokio::test]
    async fn test_unavailable_answer_degrades_to_none() {
        let (service, cache) = service();
        let result = service.get_vehicle_position("ghost").await;
        assert!(result.value.is_none());
        assert!(!result.cache_hit);
        assert!(cache.is_empty());

        cache.put(vehicle_key("bus-12"), position("Z03"));
        let result = service.get_vehicle_position("bus-12").await;
        assert!(result.cache_hit);
        assert_eq!(result.value, Some(position("Z03")));
    }

    #[tokio::test]
    async fn test_unknown_zone_keys_get_no_counters() {
        let (service, _) = service();
        for key in ["zone:bogus", "zone:Z41", "zone:Z1", "zone:"] {
            service.get_cached_or_resolve(key, || async { None }).await;
        }
        service
            .get_cached_or_resolve("vehicle:bus-12", || async { Some(position("Z99")) })
            .await;

        assert_eq!(service.get_system_statistics().total_requests, 5);
        for zone in ["bogus", "Z41", "Z1", "", "Z99"] {
            assert!(service.get_zone_statistics(&ZoneId::from(zone)).is_none(), "{zone}");
        }

        service.get_cached_or_resolve("zone:Z40", || async { None }).await;
        assert!(service.get_zone_statistics(&ZoneId::from("Z40")).is_some());
    }

    #[test]
    fn test_zone_scope() {
        assert_eq!(zone_scope("zone:Z09", None), Some(ZoneId::from("Z09")));
        assert_eq!(zone_scope("vehicle:x", Some(&position("Z02"))), Some(ZoneId::from("Z02")));
        assert_eq!(zone_scope(STOPS_KEY, Some(&CachedValue::StopList(Vec::new()))), None);
        assert_eq!(zone_key(&ZoneId::from("Z09")), "zone:Z09");
    }
}
