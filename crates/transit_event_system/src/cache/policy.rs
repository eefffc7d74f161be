//! Eviction policies.

use std::time::Duration;

/// Decides when a stored entry is no longer valid.
///
/// `record_access` / `record_insertion` let richer policies keep bookkeeping;
/// the TTL policy ignores them.
pub trait EvictionPolicy: Send + Sync + std::fmt::Debug {
    fn should_evict(&self, inserted_at_millis: u64, now_millis: u64) -> bool;

    fn record_access(&self, _key: &str) {}

    fn record_insertion(&self, _key: &str) {}
}

/// Evicts entries strictly older than a fixed TTL.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    ttl: Duration,
}

impl TtlPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl EvictionPolicy for TtlPolicy {
    fn should_evict(&self, inserted_at_millis: u64, now_millis: u64) -> bool {
        let age = now_millis.saturating_sub(inserted_at_millis);
        u128::from(age) > self.ttl.as_millis()
    }
}
