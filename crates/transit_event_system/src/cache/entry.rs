//! Cache entry wrapper.

use super::CacheValue;

/// A stored value with its insertion time. Entries are replaced, never merged.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Unix epoch milliseconds at which the value was stored
    pub inserted_at: u64,
}

impl<V: CacheValue> CacheEntry<V> {
    pub fn new(value: V, inserted_at: u64) -> Self {
        Self { value, inserted_at }
    }

    /// Serialization tag of the wrapped value.
    pub fn type_tag(&self) -> &'static str {
        self.value.type_tag()
    }

    pub fn age_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.inserted_at)
    }
}
