use super::{DeliveryError, Interest, RemoteSubscriber, RoutingError, SubscriptionManager};
use crate::events::BusEvent;
use crate::system::EventBus;
use crate::types::{ClientId, SubscriptionId, TierRole, ZoneId};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Router lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RouterState {
    Stopped = 0,
    /// Filtering normally
    Started = 1,
    /// Interest sets are being changed; inbound events are dropped
    Reconfiguring = 2,
}

impl RouterState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RouterState::Started,
            2 => RouterState::Reconfiguring,
            _ => RouterState::Stopped,
        }
    }
}

impl std::fmt::Display for RouterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RouterState::Stopped => "stopped",
            RouterState::Started => "started",
            RouterState::Reconfiguring => "reconfiguring",
        };
        f.write_str(name)
    }
}

/// Delivery tuning for one router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Upper bound for a single subscriber call
    pub delivery_timeout: Duration,
    /// Consecutive failed deliveries after which a subscriber is removed
    pub max_consecutive_failures: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_millis(500),
            max_consecutive_failures: 1,
        }
    }
}

/// Outcome of one route operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers the event was offered to
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Subscribers dropped from the registry during this operation
    pub removed: Vec<ClientId>,
    /// True when the router was not filtering and nothing was attempted
    pub suppressed: bool,
}

impl DeliveryReport {
    fn suppressed() -> Self {
        Self {
            suppressed: true,
            ..Self::default()
        }
    }
}

/// Counters for monitoring a router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Events accepted from upstream while started
    pub events_received: u64,
    /// Successful subscriber deliveries
    pub deliveries: u64,
    pub delivery_failures: u64,
    /// Events acknowledged but not delivered while reconfiguring or stopped
    pub events_dropped: u64,
    pub subscribers_removed: u64,
    pub active_subscribers: usize,
}

#[derive(Debug, Default)]
struct Counters {
    events_received: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    events_dropped: AtomicU64,
    subscribers_removed: AtomicU64,
}

/// One tier's fan-out component.
///
/// The same type serves every tier; only its upstream (whoever calls
/// [`receive_from_upstream`](Self::receive_from_upstream)) and its downstream
/// subscribers differ.
#[derive(Debug)]
pub struct EventRouter {
    tier: TierRole,
    bus: Arc<EventBus>,
    subscriptions: SubscriptionManager,
    state: AtomicU8,
    /// Open `disable_filtering` calls; guards every state change
    reconfigurations: Mutex<usize>,
    config: RouterConfig,
    counters: Counters,
}

impl EventRouter {
    /// Creates a stopped router that publishes inbound events on `bus`.
    pub fn new(tier: TierRole, bus: Arc<EventBus>, config: RouterConfig) -> Self {
        Self {
            tier,
            bus,
            subscriptions: SubscriptionManager::new(),
            state: AtomicU8::new(RouterState::Stopped as u8),
            reconfigurations: Mutex::new(0),
            config,
            counters: Counters::default(),
        }
    }

    pub fn tier(&self) -> TierRole {
        self.tier
    }

    pub fn state(&self) -> RouterState {
        RouterState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> RouterConfig {
        self.config
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    fn transition(&self, from: RouterState, to: RouterState) -> Result<(), RoutingError> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| RoutingError::InvalidTransition {
                from: RouterState::from_u8(actual),
                to,
            })
    }

    fn lifecycle(&self) -> MutexGuard<'_, usize> {
        self.reconfigurations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Stopped → Started`.
    pub fn start(&self) -> Result<(), RoutingError> {
        let _lifecycle = self.lifecycle();
        self.transition(RouterState::Stopped, RouterState::Started)?;
        info!("🛰️ {} router started", self.tier);
        Ok(())
    }

    /// Moves to `Stopped` from any state, abandoning open reconfigurations.
    /// Subscriptions are kept.
    pub fn stop(&self) {
        let mut open = self.lifecycle();
        *open = 0;
        let previous = self.state.swap(RouterState::Stopped as u8, Ordering::AcqRel);
        if RouterState::from_u8(previous) != RouterState::Stopped {
            info!("🛑 {} router stopped", self.tier);
        }
    }

    /// `Started → Reconfiguring`: stop delivering until filters are consistent.
    ///
    /// Calls nest. Filtering resumes only after every caller has called
    /// [`enable_filtering`](Self::enable_filtering).
    pub fn disable_filtering(&self) -> Result<(), RoutingError> {
        let mut open = self.lifecycle();
        match self.state() {
            RouterState::Stopped => {
                return Err(RoutingError::InvalidTransition {
                    from: RouterState::Stopped,
                    to: RouterState::Reconfiguring,
                })
            }
            RouterState::Started => {
                self.state.store(RouterState::Reconfiguring as u8, Ordering::Release);
                debug!("{} router filtering disabled", self.tier);
            }
            RouterState::Reconfiguring => {}
        }
        *open += 1;
        Ok(())
    }

    /// Closes one [`disable_filtering`](Self::disable_filtering); the last one
    /// moves `Reconfiguring → Started`.
    pub fn enable_filtering(&self) -> Result<(), RoutingError> {
        let mut open = self.lifecycle();
        if *open == 0 {
            return Err(RoutingError::InvalidTransition {
                from: self.state(),
                to: RouterState::Started,
            });
        }
        *open -= 1;
        if *open == 0 {
            self.transition(RouterState::Reconfiguring, RouterState::Started)?;
            debug!("{} router filtering enabled", self.tier);
        }
        Ok(())
    }

    /// Registers a downstream client. Rejected while stopped.
    pub fn subscribe(
        &self,
        client_id: ClientId,
        interest: Interest,
        endpoint: Arc<dyn RemoteSubscriber>,
    ) -> Result<SubscriptionId, RoutingError> {
        match self.state() {
            RouterState::Stopped => Err(RoutingError::NotStarted(RouterState::Stopped)),
            RouterState::Started | RouterState::Reconfiguring => {
                Ok(self.subscriptions.subscribe(client_id, interest, endpoint))
            }
        }
    }

    pub fn unsubscribe(&self, client_id: &ClientId) -> bool {
        self.subscriptions.unsubscribe(client_id).is_some()
    }

    /// Changes a client's interest set with filtering disabled for the
    /// duration of the swap, so no event is matched against a half-updated
    /// filter. Concurrent calls share one reconfiguration window.
    pub fn reconfigure(&self, client_id: &ClientId, interest: Interest) -> Result<(), RoutingError> {
        self.disable_filtering()?;
        let found = self.subscriptions.set_interest(client_id, interest);
        self.enable_filtering()?;
        if found {
            Ok(())
        } else {
            Err(RoutingError::UnknownClient(*client_id))
        }
    }

    /// Delivers `event` to clients whose interest is `all` or contains `zone`.
    pub async fn route_to_zone(&self, event: &BusEvent, zone: &ZoneId) -> DeliveryReport {
        if !self.is_filtering() {
            return self.suppress(event);
        }
        let targets = self.subscriptions.targets(Some(zone));
        trace!("Routing {} event for {} to {} subscribers", event.kind(), zone, targets.len());
        self.deliver(event, targets).await
    }

    /// Delivers `event` to every client regardless of interest.
    pub async fn route_to_all(&self, event: &BusEvent) -> DeliveryReport {
        if !self.is_filtering() {
            return self.suppress(event);
        }
        let targets = self.subscriptions.targets(None);
        trace!("Routing {} event to all {} subscribers", event.kind(), targets.len());
        self.deliver(event, targets).await
    }

    /// Zone-scoped events go through [`route_to_zone`](Self::route_to_zone),
    /// the rest through [`route_to_all`](Self::route_to_all).
    pub async fn forward(&self, event: &BusEvent) -> DeliveryReport {
        match event.zone() {
            Some(zone) => self.route_to_zone(event, zone).await,
            None => self.route_to_all(event).await,
        }
    }

    /// Entry point for events arriving from the upstream tier: publish on the
    /// local bus, then forward downstream.
    ///
    /// While reconfiguring the event is acknowledged and dropped.
    pub async fn receive_from_upstream(&self, event: BusEvent) -> Result<DeliveryReport, RoutingError> {
        match self.state() {
            RouterState::Stopped => {
                self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
                Err(RoutingError::NotStarted(RouterState::Stopped))
            }
            RouterState::Reconfiguring => Ok(self.suppress(&event)),
            RouterState::Started => {
                self.counters.events_received.fetch_add(1, Ordering::Relaxed);
                self.bus.publish(event.clone()).await;
                Ok(self.forward(&event).await)
            }
        }
    }

    fn is_filtering(&self) -> bool {
        self.state() == RouterState::Started
    }

    fn suppress(&self, event: &BusEvent) -> DeliveryReport {
        self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
        trace!("{} router is {}, dropping {} event", self.tier, self.state(), event.kind());
        DeliveryReport::suppressed()
    }

    async fn deliver(
        &self,
        event: &BusEvent,
        targets: Vec<(ClientId, Arc<dyn RemoteSubscriber>)>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport {
            attempted: targets.len(),
            ..DeliveryReport::default()
        };
        if targets.is_empty() {
            return report;
        }

        let timeout = self.config.delivery_timeout;
        let mut in_flight: FuturesUnordered<_> = targets
            .into_iter()
            .map(|(client_id, endpoint)| async move {
                let outcome = match tokio::time::timeout(timeout, endpoint.deliver(event)).await {
                    Ok(result) => result,
                    Err(_) => Err(DeliveryError::Timeout(timeout)),
                };
                (client_id, endpoint, outcome)
            })
            .collect();

        while let Some((client_id, endpoint, outcome)) = in_flight.next().await {
            match outcome {
                Ok(()) => {
                    report.delivered += 1;
                    self.subscriptions.record_success(&client_id);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("⚠️ Delivery to {} ({}) failed: {}", client_id, endpoint.name(), e);
                    if self
                        .subscriptions
                        .record_failure(&client_id, self.config.max_consecutive_failures)
                    {
                        warn!("🧹 Removed unreachable subscriber {} ({})", client_id, endpoint.name());
                        report.removed.push(client_id);
                    }
                }
            }
        }

        self.counters
            .deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters
            .delivery_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        self.counters
            .subscribers_removed
            .fetch_add(report.removed.len() as u64, Ordering::Relaxed);
        report
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            events_received: self.counters.events_received.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
            events_dropped: self.counters.events_dropped.load(Ordering::Relaxed),
            subscribers_removed: self.counters.subscribers_removed.load(Ordering::Relaxed),
            active_subscribers: self.subscriptions.len(),
        }
    }
}
