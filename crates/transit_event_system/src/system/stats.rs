/// Statistics tracking for the event bus
use serde::{Deserialize, Serialize};

/// Event bus counters for monitoring
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBusStats {
    /// Total number of registered event handlers
    pub total_handlers: usize,
    /// Events accepted for delivery while the bus was running
    pub events_published: u64,
    /// Events published while the bus was stopped
    pub events_dropped: u64,
    /// Handler invocations that returned an error or panicked
    pub handler_failures: u64,
}
