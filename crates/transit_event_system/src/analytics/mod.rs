//! # Statistics Collection
//!
//! Thread-safe request/cache counters for the query surface and the analytics
//! observer. One [`StatCounter`] tracks the whole tier; further counters are
//! created lazily per zone the first time that zone is observed and are never
//! removed for the lifetime of the process.
//!
//! Counters are plain atomics. Readers may see a hit recorded before the
//! matching request total; no snapshot isolation is attempted.

use crate::events::{AnalyticsSnapshot, EnrichedEvent, EventError};
use crate::system::{EventBus, HandlerId};
use crate::types::{TierRole, ZoneId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters for one scope (global or one zone).
#[derive(Debug, Default)]
pub struct StatCounter {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cumulative_latency_micros: AtomicU64,
    events_observed: AtomicU64,
    active_connections: AtomicI64,
}

impl StatCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    pub fn record_miss(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    /// Counts an enriched event seen on the bus.
    pub fn record_event(&self) {
        self.events_observed.fetch_add(1, Ordering::Relaxed);
    }

    /// Callers must pair every increment with a decrement; the gauge only goes
    /// negative through a caller bug.
    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    fn add_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.cumulative_latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// `hits / total`, or 0.0 before the first request.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.cache_hits() as f64 / total as f64
        }
    }

    /// Mean latency in milliseconds, or 0.0 before the first request.
    pub fn avg_response_time_ms(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.cumulative_latency_micros.load(Ordering::Relaxed) as f64 / total as f64 / 1000.0
        }
    }

    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            total_requests: self.total_requests(),
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            cumulative_latency_micros: self.cumulative_latency_micros.load(Ordering::Relaxed),
            events_observed: self.events_observed.load(Ordering::Relaxed),
            active_connections: self.active_connections(),
            hit_rate: self.hit_rate(),
            avg_response_time_ms: self.avg_response_time_ms(),
        }
    }
}

/// Serializable copy of a [`StatCounter`] at one moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cumulative_latency_micros: u64,
    pub events_observed: u64,
    pub active_connections: i64,
    pub hit_rate: f64,
    pub avg_response_time_ms: f64,
}

/// Global plus per-zone counters for one tier.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    global: StatCounter,
    zones: DashMap<ZoneId, Arc<StatCounter>>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self) -> &StatCounter {
        &self.global
    }

    /// Get-or-create the counter for `zone`.
    pub fn zone(&self, zone: &ZoneId) -> Arc<StatCounter> {
        if let Some(existing) = self.zones.get(zone) {
            return existing.value().clone();
        }
        self.zones.entry(zone.clone()).or_default().value().clone()
    }

    /// Existing counter for `zone`, without creating one.
    pub fn existing_zone(&self, zone: &ZoneId) -> Option<Arc<StatCounter>> {
        self.zones.get(zone).map(|entry| entry.value().clone())
    }

    /// Records a cache hit globally and, when given, for one zone.
    pub fn record_hit(&self, zone: Option<&ZoneId>, latency: Duration) {
        self.global.record_hit(latency);
        if let Some(zone) = zone {
            self.zone(zone).record_hit(latency);
        }
    }

    pub fn record_miss(&self, zone: Option<&ZoneId>, latency: Duration) {
        self.global.record_miss(latency);
        if let Some(zone) = zone {
            self.zone(zone).record_miss(latency);
        }
    }

    pub fn record_event(&self, zone: &ZoneId) {
        self.global.record_event();
        self.zone(zone).record_event();
    }

    pub fn tracked_zones(&self) -> usize {
        self.zones.len()
    }

    pub fn zone_snapshots(&self) -> BTreeMap<ZoneId, StatSnapshot> {
        self.zones
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Builds the analytics event for this tier.
    pub fn analytics_snapshot(&self, tier: TierRole, taken_at: u64) -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            tier,
            taken_at,
            system: self.global.snapshot(),
            zones: self.zone_snapshots(),
        }
    }

    /// Subscribes this collector to `bus` so every enriched event is counted
    /// against its zone.
    pub async fn observe(self: &Arc<Self>, bus: &EventBus) -> HandlerId {
        let collector = Arc::clone(self);
        bus.on("statistics_observer", move |event: EnrichedEvent| -> Result<(), EventError> {
            collector.record_event(&event.zone_id);
            Ok(())
        })
        .await
    }
}
