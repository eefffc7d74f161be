/// Event handler registration methods
use crate::events::{Event, EventError, EventHandler, EventKind, TypedEventHandler};
use super::core::{EventBus, HandlerId, RegisteredHandler};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

impl EventBus {
    /// Registers a closure for one concrete event type.
    ///
    /// Multiple handlers per type are allowed. They are invoked in insertion
    /// order, which callers must not rely on.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use transit_event_system::{EventBus, EnrichedEvent};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let bus = EventBus::new();
    /// let id = bus.on("zone_logger", |event: EnrichedEvent| {
    ///     println!("{} entered {}", event.source_id, event.zone_id);
    ///     Ok(())
    /// }).await;
    /// assert!(bus.unsubscribe(transit_event_system::EventKind::Enriched, id).await);
    /// # }
    /// ```
    pub async fn on<T, F>(&self, name: &str, handler: F) -> HandlerId
    where
        T: Event,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let typed = TypedEventHandler::new(name, handler);
        self.subscribe(Arc::new(typed)).await
    }

    /// Registers a handler under the event kind it reports.
    pub async fn subscribe(&self, handler: Arc<dyn EventHandler>) -> HandlerId {
        let kind = handler.event_kind();
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        debug!("📝 Registering handler '{}' for {} events", handler.handler_name(), kind);

        self.handlers
            .entry(kind)
            .or_default()
            .push(RegisteredHandler { id, handler });

        let mut stats = self.stats.write().await;
        stats.total_handlers += 1;
        id
    }

    /// Removes a specific handler. Returns `false` (and does nothing) when the
    /// handler is not registered under `kind`.
    pub async fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        let removed = match self.handlers.get_mut(&kind) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|registered| registered.id != id);
                before != entry.len()
            }
            None => false,
        };

        if removed {
            info!("🗑️ Removed handler {:?} for {} events", id, kind);
            let mut stats = self.stats.write().await;
            stats.total_handlers = stats.total_handlers.saturating_sub(1);
        }
        removed
    }
}
