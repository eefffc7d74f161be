//! Core tier controller.
//!
//! `TierController` owns one tier's components and wires them together: the
//! resolver enriches records, the bus fans them out to local consumers (the
//! statistics observer and the cache warmer), the router forwards them to the
//! tier below, and the cache answers queries.

use crate::{
    collaborators::{SessionAuthority, StopDirectory},
    config::TierConfig,
    error::TierError,
    query::{vehicle_key, QueryService},
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use transit_event_system::{
    AnalyticsSnapshot, CacheManager, CachedValue, ClientId, Clock, DeliveryReport, EnrichedEvent,
    EventBus, EventError, EventRouter, GeoZoneResolver, Interest, PipelineMonitor, RestoreReport,
    ShutdownState, StatisticsCollector, SystemClock, TierRole,
};

/// A downstream client admitted through [`TierController::connect_client`].
#[derive(Debug, Clone)]
pub(crate) struct ClientSession {
    pub(crate) subject: String,
    /// Zones the client may ever subscribe to
    pub(crate) entitled: Interest,
}

/// One tier of the pipeline.
///
/// # Lifecycle
///
/// 1. [`new`](Self::new) builds the resolver, cache and router
/// 2. [`start`](Self::start) opens the bus, registers local consumers,
///    restores the cache snapshot and starts the router
/// 3. records arrive through [`ingest`](Self::ingest) (origin tier) or from
///    the tier above through the router
/// 4. [`shutdown`](Self::shutdown) stops intake and saves the cache snapshot
pub struct TierController {
    pub(crate) config: TierConfig,
    pub(crate) resolver: GeoZoneResolver,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) router: Arc<EventRouter>,
    pub(crate) cache: Arc<CacheManager<CachedValue>>,
    pub(crate) statistics: Arc<StatisticsCollector>,
    pub(crate) stops: Arc<dyn StopDirectory>,
    pub(crate) sessions: Option<Arc<dyn SessionAuthority>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) clients: DashMap<ClientId, ClientSession>,
    pub(crate) shutdown_state: ShutdownState,
    started: AtomicBool,
}

impl std::fmt::Debug for TierController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierController")
            .field("role", &self.config.role)
            .field("router_state", &self.router.state())
            .field("clients", &self.clients.len())
            .finish()
    }
}

impl TierController {
    /// Builds a tier that reads the system clock.
    pub fn new(config: TierConfig, stops: Arc<dyn StopDirectory>) -> Result<Self, TierError> {
        Self::with_clock(config, stops, Arc::new(SystemClock))
    }

    /// Builds a tier on an explicit clock. Fails only when the grid is invalid
    /// or cache storage cannot be initialized.
    pub fn with_clock(
        config: TierConfig,
        stops: Arc<dyn StopDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TierError> {
        let resolver = GeoZoneResolver::new(config.bounds, config.grid_rows, config.grid_columns)?;
        let cache = Arc::new(CacheManager::new(config.cache_config(), clock.clone())?);
        let bus = Arc::new(EventBus::new());
        let router = Arc::new(EventRouter::new(config.role, bus.clone(), config.router_config()));

        debug!(
            "Assembled {} tier: {}x{} grid, cache ttl {:?}",
            config.role, config.grid_rows, config.grid_columns, config.cache_ttl
        );

        Ok(Self {
            config,
            resolver,
            bus,
            router,
            cache,
            statistics: Arc::new(StatisticsCollector::new()),
            stops,
            sessions: None,
            clock,
            clients: DashMap::new(),
            shutdown_state: ShutdownState::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Requires a valid session token for [`connect_client`](Self::connect_client).
    pub fn with_session_authority(mut self, sessions: Arc<dyn SessionAuthority>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Shares a process-wide shutdown state instead of the tier's own.
    pub fn with_shutdown_state(mut self, shutdown_state: ShutdownState) -> Self {
        self.shutdown_state = shutdown_state;
        self
    }

    /// Opens the bus, registers the local consumers, pre-warms the cache from
    /// its snapshot and starts the router.
    pub async fn start(&self) -> Result<RestoreReport, TierError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(TierError::AlreadyStarted);
        }
        let role = self.config.role;
        info!("🚀 Starting {} tier", role);

        self.bus.start();
        self.statistics.observe(&self.bus).await;
        if self.config.warms_vehicle_cache() {
            self.register_cache_warmer().await;
        }

        let restored = self.cache.load_snapshot().await;
        self.router.start()?;

        info!(
            "✅ {} tier ready ({} cached entries restored, {} bus handlers)",
            role,
            restored.restored,
            self.bus.get_stats().await.total_handlers
        );
        Ok(restored)
    }

    /// Keeps the latest enriched event of every source under `vehicle:<source>`.
    async fn register_cache_warmer(&self) {
        let cache = self.cache.clone();
        self.bus
            .on("vehicle_cache_warmer", move |event: EnrichedEvent| -> Result<(), EventError> {
                let key = vehicle_key(&event.source_id);
                let sequence_id = event.sequence_id;
                // Out-of-order delivery must not roll a vehicle back.
                let stored = cache.put_if(key, CachedValue::VehiclePosition(event), |current| match current {
                    CachedValue::VehiclePosition(current) => current.sequence_id <= sequence_id,
                    _ => true,
                });
                if !stored {
                    trace!("Kept newer cached position over #{}", sequence_id);
                }
                Ok(())
            })
            .await;
    }

    /// Publishes this tier's counters on the bus and forwards them to every
    /// downstream subscriber.
    pub async fn publish_analytics(&self) -> DeliveryReport {
        let snapshot: AnalyticsSnapshot = self
            .statistics
            .analytics_snapshot(self.config.role, self.clock.now_millis());
        self.bus.publish(snapshot.clone()).await;
        self.router.route_to_all(&snapshot.into()).await
    }

    /// Stops intake and persists the cache. Returns the number of snapshot
    /// entries written; a failed save is returned but leaves the tier usable.
    pub async fn shutdown(&self) -> Result<usize, TierError> {
        let role = self.config.role;
        info!("🛑 Shutting down {} tier", role);
        self.router.stop();
        self.bus.stop();

        match self.cache.save_snapshot().await {
            Ok(written) => {
                if self.cache.snapshot_store().is_some() {
                    info!("💾 {} tier persisted {} cache entries", role, written);
                }
                Ok(written)
            }
            Err(e) => {
                warn!("⚠️ {} tier could not persist its cache: {}", role, e);
                Err(e.into())
            }
        }
    }

    pub fn role(&self) -> TierRole {
        self.config.role
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    pub fn resolver(&self) -> &GeoZoneResolver {
        &self.resolver
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn router(&self) -> Arc<EventRouter> {
        self.router.clone()
    }

    pub fn cache(&self) -> Arc<CacheManager<CachedValue>> {
        self.cache.clone()
    }

    pub fn statistics(&self) -> Arc<StatisticsCollector> {
        self.statistics.clone()
    }

    pub fn shutdown_state(&self) -> &ShutdownState {
        &self.shutdown_state
    }

    pub fn query_service(&self) -> QueryService {
        QueryService::new(
            self.cache.clone(),
            self.statistics.clone(),
            self.bus.clone(),
            self.resolver.clone(),
        )
    }

    /// Health reporter over this tier's components.
    pub fn monitor(&self) -> PipelineMonitor {
        PipelineMonitor::new(
            self.config.role,
            self.bus.clone(),
            self.router.clone(),
            self.statistics.clone(),
        )
        .with_cache(self.cache.clone())
    }
}
