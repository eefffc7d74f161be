//! # Utility Functions
//!
//! Small helpers shared across the pipeline components.
//!
//! ## Key Functions
//!
//! - [`current_timestamp()`] - Unix time in seconds
//! - [`current_timestamp_millis()`] - Unix time in milliseconds, used for event
//!   and cache timestamps
//! - [`create_event_bus()`] - Event bus factory function

use crate::system::EventBus;
use std::sync::Arc;

/// Returns the current Unix timestamp in seconds.
///
/// A clock set before the Unix epoch yields `0` rather than panicking.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Returns the current Unix timestamp in milliseconds.
pub fn current_timestamp_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Creates a new, started event bus ready to be shared across tasks.
pub fn create_event_bus() -> Arc<EventBus> {
    let bus = Arc::new(EventBus::new());
    bus.start();
    bus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_and_seconds_agree() {
        let secs = current_timestamp();
        let millis = current_timestamp_millis();
        assert!(millis / 1000 >= secs);
        assert!(millis / 1000 - secs <= 1);
    }

    #[tokio::test]
    async fn test_created_bus_is_running() {
        let bus = create_event_bus();
        assert!(bus.is_running());
    }
}
