/// Per-tier health reporting
use crate::analytics::{StatSnapshot, StatisticsCollector};
use crate::cache::{CacheManager, CacheStats, CachedValue};
use crate::routing::{EventRouter, RouterStats};
use crate::system::{EventBus, EventBusStats};
use crate::types::TierRole;
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Share of failed deliveries above which a tier is reported unhealthy.
const DELIVERY_FAILURE_ALERT_RATIO: f64 = 0.25;

/// Collects the counters of one tier's components into a [`TierReport`].
#[derive(Debug)]
pub struct PipelineMonitor {
    tier: TierRole,
    start_time: Instant,
    last_report: Instant,
    bus: Arc<EventBus>,
    router: Arc<EventRouter>,
    statistics: Arc<StatisticsCollector>,
    cache: Option<Arc<CacheManager<CachedValue>>>,
}

impl PipelineMonitor {
    pub fn new(
        tier: TierRole,
        bus: Arc<EventBus>,
        router: Arc<EventRouter>,
        statistics: Arc<StatisticsCollector>,
    ) -> Self {
        Self {
            tier,
            start_time: Instant::now(),
            last_report: Instant::now(),
            bus,
            router,
            statistics,
            cache: None,
        }
    }

    /// Includes cache counters in reports.
    pub fn with_cache(mut self, cache: Arc<CacheManager<CachedValue>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn generate_report(&mut self) -> TierReport {
        let now = Instant::now();
        let uptime = now.duration_since(self.start_time);
        let since_last = now.duration_since(self.last_report);
        self.last_report = now;

        TierReport {
            tier: self.tier,
            timestamp: current_timestamp(),
            uptime_seconds: uptime.as_secs(),
            report_interval_seconds: since_last.as_secs(),
            bus: self.bus.get_stats().await,
            router: self.router.stats(),
            cache: self.cache.as_ref().map(|cache| cache.stats()),
            system: self.statistics.global().snapshot(),
            tracked_zones: self.statistics.tracked_zones(),
        }
    }
}

/// Point-in-time view of one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierReport {
    pub tier: TierRole,
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub report_interval_seconds: u64,
    pub bus: EventBusStats,
    pub router: RouterStats,
    pub cache: Option<CacheStats>,
    pub system: StatSnapshot,
    pub tracked_zones: usize,
}

impl TierReport {
    /// Share of subscriber deliveries that failed, 0.0 with no traffic.
    pub fn delivery_failure_ratio(&self) -> f64 {
        let attempts = self.router.deliveries + self.router.delivery_failures;
        if attempts == 0 {
            0.0
        } else {
            self.router.delivery_failures as f64 / attempts as f64
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.delivery_failure_ratio() <= DELIVERY_FAILURE_ALERT_RATIO
    }

    /// Conditions an operator should look at.
    pub fn alerts(&self) -> Vec<String> {
        let mut alerts = Vec::new();

        if self.bus.total_handlers == 0 {
            alerts.push(format!("{} tier has no bus handlers registered", self.tier));
        }
        if !self.is_healthy() {
            alerts.push(format!(
                "{} tier delivery failure ratio at {:.1}%",
                self.tier,
                self.delivery_failure_ratio() * 100.0
            ));
        }
        if self.router.events_dropped > 0 {
            alerts.push(format!(
                "{} tier dropped {} events while not filtering",
                self.tier, self.router.events_dropped
            ));
        }

        alerts
    }
}
