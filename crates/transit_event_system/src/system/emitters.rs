/// Event publication
use crate::events::{BusEvent, EventError};
use super::core::EventBus;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, trace};

impl EventBus {
    /// Publishes an event to every handler registered for its kind.
    ///
    /// The handler list is snapshotted before the first handler runs, and
    /// handlers are awaited one after another on the calling task. A handler
    /// that returns an error or panics is logged and counted; the remaining
    /// handlers still run.
    ///
    /// Returns the number of handlers that completed successfully. Publishing
    /// while the bus is stopped, or with no handlers registered, returns 0.
    pub async fn publish(&self, event: impl Into<BusEvent>) -> usize {
        let event = event.into();
        let kind = event.kind();

        if !self.is_running() {
            trace!("Bus stopped, dropping {} event", kind);
            self.stats.write().await.events_dropped += 1;
            return 0;
        }

        // Clone the Vec of Arcs so the registry guard is released before any
        // handler runs; handlers may (un)subscribe re-entrantly.
        let snapshot = self.handlers.get(&kind).map(|entry| entry.value().clone());

        let mut succeeded = 0;
        let mut failures = 0;
        if let Some(handlers) = snapshot {
            if cfg!(debug_assertions) && !handlers.is_empty() {
                debug!("📤 Publishing {} event to {} handlers", kind, handlers.len());
            }

            for registered in handlers.iter() {
                let name = registered.handler.handler_name();
                let outcome = AssertUnwindSafe(registered.handler.handle(&event))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(EventError::HandlerPanicked(panic_message(panic))));

                match outcome {
                    Ok(()) => succeeded += 1,
                    Err(e) => {
                        failures += 1;
                        error!("❌ Handler {} failed: {}", name, e);
                    }
                }
            }
        }

        let mut stats = self.stats.write().await;
        stats.events_published += 1;
        stats.handler_failures += failures;
        succeeded
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
