/// Core EventBus implementation
use crate::events::{EventHandler, EventKind};
use super::stats::EventBusStats;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Identifier returned when a handler is registered, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(super) u64);

/// A handler together with the id it was registered under.
#[derive(Debug, Clone)]
pub(super) struct RegisteredHandler {
    pub(super) id: HandlerId,
    pub(super) handler: Arc<dyn EventHandler>,
}

/// In-process typed publish/subscribe dispatcher, one per service tier.
///
/// Handlers are registered under the exact [`EventKind`] of the event they
/// consume. Publishing takes a snapshot of the handler list and invokes it
/// sequentially on the publishing task, so registrations made while a publish
/// is in flight only affect later publishes.
///
/// Uses DashMap for the handler registry so producers and consumers on
/// different tasks never contend on a bus-wide lock.
pub struct EventBus {
    /// Map of event kinds to their registered handlers, in insertion order
    pub(super) handlers: DashMap<EventKind, Vec<RegisteredHandler>>,
    /// Publication gate; events published while stopped are dropped
    pub(super) running: AtomicBool,
    /// Source of handler ids
    pub(super) next_handler_id: AtomicU64,
    /// Bus statistics for monitoring
    pub(super) stats: RwLock<EventBusStats>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &"[handlers]")
            .field("running", &self.is_running())
            .finish()
    }
}

impl EventBus {
    /// Creates a stopped bus with no registered handlers.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            running: AtomicBool::new(false),
            next_handler_id: AtomicU64::new(1),
            stats: RwLock::new(EventBusStats::default()),
        }
    }

    /// Opens the publication gate.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::AcqRel) {
            info!("🚌 Event bus started");
        }
    }

    /// Closes the publication gate. Events published afterwards are dropped,
    /// not queued.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("🛑 Event bus stopped");
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Gets the current bus statistics
    pub async fn get_stats(&self) -> EventBusStats {
        self.stats.read().await.clone()
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map(|entry| entry.len()).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
