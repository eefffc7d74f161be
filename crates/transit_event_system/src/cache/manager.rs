//! The cache manager: storage + policy + persistence.

use super::{CacheEntry, CacheError, CacheValue, EvictionPolicy, SnapshotStore, TtlPolicy};
use crate::clock::Clock;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for one cache instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum age before an entry is considered stale
    pub ttl: Duration,
    /// Where the snapshot is kept; `None` disables persistence
    pub snapshot_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            snapshot_path: None,
        }
    }
}

/// Counters describing cache traffic since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Outcome of [`CacheManager::get_or_resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<V> {
    /// The cached or freshly resolved value, `None` when unavailable
    pub value: Option<V>,
    /// Whether the value was served from the cache
    pub hit: bool,
}

/// Summary of a snapshot restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub expired: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
}

/// A concurrent TTL cache with optional atomic snapshot persistence.
///
/// Expiry is lazy: an entry older than the TTL stays in memory until a read
/// touches it or [`purge_expired`](Self::purge_expired) runs.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use transit_event_system::cache::{CacheConfig, CacheManager, CachedValue};
/// use transit_event_system::clock::ManualClock;
///
/// let clock = Arc::new(ManualClock::new(0));
/// let config = CacheConfig { ttl: Duration::from_secs(60), snapshot_path: None };
/// let cache: CacheManager<CachedValue> = CacheManager::new(config, clock.clone()).unwrap();
///
/// cache.put("stops:known", CachedValue::StopList(Vec::new()));
/// assert!(cache.get("stops:known").is_some());
///
/// clock.advance(Duration::from_secs(61));
/// assert!(cache.get("stops:known").is_none());
/// ```
#[derive(Debug)]
pub struct CacheManager<V: CacheValue> {
    storage: DashMap<String, CacheEntry<V>>,
    policy: Arc<dyn EvictionPolicy>,
    clock: Arc<dyn Clock>,
    persistence: Option<SnapshotStore>,
    counters: Counters,
}

impl<V: CacheValue> CacheManager<V> {
    /// Creates a TTL cache. Fails when the TTL is zero or the snapshot
    /// directory cannot be created.
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        if config.ttl.is_zero() {
            return Err(CacheError::InvalidConfig("ttl must be greater than zero".to_string()));
        }
        let policy = Arc::new(TtlPolicy::new(config.ttl));
        Self::with_policy(config, policy, clock)
    }

    /// Creates a cache with a custom eviction policy. `config.ttl` is ignored.
    pub fn with_policy(
        config: CacheConfig,
        policy: Arc<dyn EvictionPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let persistence = match config.snapshot_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Some(SnapshotStore::new(path))
            }
            None => None,
        };

        Ok(Self {
            storage: DashMap::new(),
            policy,
            clock,
            persistence,
            counters: Counters::default(),
        })
    }

    /// Returns the value for `key`, evicting it first if the policy says it
    /// is stale.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();

        let value = match self.storage.get(key) {
            Some(entry) if !self.policy.should_evict(entry.inserted_at, now) => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match value {
            Some(value) => {
                self.policy.record_access(key);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                // Re-check under the write lock: a concurrent put may have refreshed it.
                let removed = self
                    .storage
                    .remove_if(key, |_, entry| self.policy.should_evict(entry.inserted_at, now));
                if removed.is_some() {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!("Evicted stale cache entry '{}'", key);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let entry = CacheEntry::new(value, self.clock.now_millis());
        self.policy.record_insertion(&key);
        self.storage.insert(key, entry);
        self.counters.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Stores `value` unless a live entry exists for which `replace` returns
    /// false. The check and the write happen under the same shard lock.
    /// Returns whether the value was stored.
    pub fn put_if(&self, key: impl Into<String>, value: V, replace: impl FnOnce(&V) -> bool) -> bool {
        let now = self.clock.now_millis();
        match self.storage.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if !self.policy.should_evict(current.inserted_at, now) && !replace(&current.value) {
                    return false;
                }
                self.policy.record_insertion(occupied.key());
                occupied.insert(CacheEntry::new(value, now));
            }
            Entry::Vacant(vacant) => {
                self.policy.record_insertion(vacant.key());
                vacant.insert(CacheEntry::new(value, now));
            }
        }
        self.counters.insertions.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Removes `key`. Returns whether an entry existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.storage.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drops every entry the policy considers stale. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.storage.len();
        self.storage
            .retain(|_, entry| !self.policy.should_evict(entry.inserted_at, now));
        let removed = before.saturating_sub(self.storage.len());
        self.counters.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            insertions: self.counters.insertions.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.storage.len(),
        }
    }

    /// Read-through lookup: serves from the cache, otherwise runs `resolve`
    /// and stores its result. A `None` from `resolve` is not cached.
    pub async fn get_or_resolve<F, Fut>(&self, key: &str, resolve: F) -> CacheLookup<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<V>>,
    {
        if let Some(value) = self.get(key) {
            return CacheLookup { value: Some(value), hit: true };
        }

        let value = resolve().await;
        if let Some(value) = &value {
            self.put(key, value.clone());
        }
        CacheLookup { value, hit: false }
    }

    /// Pre-warms the cache from the snapshot file, keeping only entries still
    /// within the TTL. Never fails; problems are logged and the cache starts
    /// with whatever could be restored.
    pub async fn load_snapshot(&self) -> RestoreReport {
        let Some(store) = &self.persistence else {
            return RestoreReport::default();
        };

        let loaded = store.load::<V>().await;
        let now = self.clock.now_millis();
        let mut report = RestoreReport {
            skipped: loaded.skipped,
            ..RestoreReport::default()
        };

        for (key, entry) in loaded.entries {
            if self.policy.should_evict(entry.inserted_at, now) {
                report.expired += 1;
                continue;
            }
            self.policy.record_insertion(&key);
            self.storage.insert(key, entry);
            report.restored += 1;
        }

        info!(
            "📦 Restored {} cache entries ({} expired, {} unreadable)",
            report.restored, report.expired, report.skipped
        );
        report
    }

    /// Writes every stored entry to the snapshot file atomically. Returns the
    /// number of entries written; `Ok(0)` when persistence is disabled.
    pub async fn save_snapshot(&self) -> Result<usize, CacheError> {
        let Some(store) = &self.persistence else {
            return Ok(0);
        };

        // Copy out first so no map guard is held across the file I/O.
        let entries: Vec<(String, CacheEntry<V>)> = self
            .storage
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect();

        let snapshot = SnapshotStore::build_snapshot(
            entries.iter().map(|(key, entry)| (key.as_str(), entry)),
            self.clock.now_millis(),
        );
        let written = snapshot.entries.len();
        if let Err(e) = store.save(&snapshot).await {
            warn!("⚠️ Failed to save cache snapshot to {}: {}", store.path().display(), e);
            return Err(e);
        }
        Ok(written)
    }

    pub fn snapshot_store(&self) -> Option<&SnapshotStore> {
        self.persistence.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedValue;
    use crate::clock::ManualClock;
    use crate::types::Stop;

    const TTL: Duration = Duration::from_secs(600);

    fn stops(ids: &[u64]) -> CachedValue {
        CachedValue::StopList(ids.iter().map(|id| Stop::new(*id, 3.4, -76.5)).collect())
    }

    fn cache_with(clock: Arc<ManualClock>, path: Option<PathBuf>) -> CacheManager<CachedValue> {
        let config = CacheConfig { ttl: TTL, snapshot_path: path };
        CacheManager::new(config, clock).expect("cache")
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = CacheConfig { ttl: Duration::ZERO, snapshot_path: None };
        let result = CacheManager::<CachedValue>::new(config, Arc::new(ManualClock::new(0)));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_ttl_round_trip() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = cache_with(clock.clone(), None);

        cache.put("stops:known", stops(&[1, 2]));
        assert_eq!(cache.get("stops:known"), Some(stops(&[1, 2])));

        clock.advance(TTL);
        assert!(cache.get("stops:known").is_some(), "age == ttl is still valid");

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("stops:known"), None);
        assert!(cache.is_empty(), "stale entry is removed on read");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_put_replaces_and_resets_age() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache_with(clock.clone(), None);

        cache.put("k", stops(&[1]));
        clock.advance(Duration::from_secs(500));
        cache.put("k", stops(&[2]));
        clock.advance(Duration::from_secs(500));

        assert_eq!(cache.get("k"), Some(stops(&[2])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_clear_and_purge() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache_with(clock.clone(), None);

        cache.put("a", stops(&[1]));
        cache.put("b", stops(&[2]));
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));

        clock.advance(TTL + Duration::from_secs(1));
        cache.put("c", stops(&[3]));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fresh_stats_hit_rate_is_zero() {
        let cache = cache_with(Arc::new(ManualClock::new(0)), None);
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_get_or_resolve_caches_only_found_values() {
        let cache = cache_with(Arc::new(ManualClock::new(0)), None);

        let miss = cache.get_or_resolve("k", || async { Some(stops(&[9])) }).await;
        assert!(!miss.hit);
        assert_eq!(miss.value, Some(stops(&[9])));

        let hit = cache.get_or_resolve("k", || async { panic!("must not resolve") }).await;
        assert!(hit.hit);

        let unavailable = cache.get_or_resolve("none", || async { None }).await;
        assert_eq!(unavailable, CacheLookup { value: None, hit: false });
        assert!(cache.get("none").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("cache.json");
        let clock = Arc::new(ManualClock::new(10_000_000));

        let cache = cache_with(clock.clone(), Some(path.clone()));
        cache.put("a", stops(&[1]));
        cache.put("b", stops(&[2, 3]));
        assert_eq!(cache.save_snapshot().await.expect("save"), 2);

        let restored = cache_with(clock.clone(), Some(path));
        let report = restored.load_snapshot().await;
        assert_eq!(report, RestoreReport { restored: 2, expired: 0, skipped: 0 });
        assert_eq!(restored.get("a"), Some(stops(&[1])));
        assert_eq!(restored.get("b"), Some(stops(&[2, 3])));
    }

    #[tokio::test]
    async fn test_expired_entries_dropped_at_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");
        let clock = Arc::new(ManualClock::new(0));

        let cache = cache_with(clock.clone(), Some(path.clone()));
        cache.put("old", stops(&[1]));
        clock.advance(Duration::from_secs(7_200 - 60));
        cache.put("recent", stops(&[2]));
        cache.save_snapshot().await.expect("save");

        clock.advance(Duration::from_secs(60));
        let restored = cache_with(clock.clone(), Some(path));
        let report = restored.load_snapshot().await;

        assert_eq!(report.restored, 1);
        assert_eq!(report.expired, 1);
        assert!(restored.get("old").is_none());
        assert!(restored.get("recent").is_some());
    }

    #[tokio::test]
    async fn test_missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_with(Arc::new(ManualClock::new(0)), Some(dir.path().join("nope.json")));
        assert_eq!(cache.load_snapshot().await, RestoreReport::default());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_disabled_is_noop() {
        let cache = cache_with(Arc::new(ManualClock::new(0)), None);
        cache.put("a", stops(&[1]));
        assert_eq!(cache.save_snapshot().await.expect("save"), 0);
        assert!(cache.snapshot_store().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_and_readers() {
        let cache = Arc::new(cache_with(Arc::new(ManualClock::new(0)), None));
        let mut tasks = Vec::new();
        for worker in 0..8u64 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                for n in 0..50u64 {
                    let key = format!("vehicle:{}", (worker * 50 + n) % 40);
                    cache.put(key.clone(), stops(&[n]));
                    let _ = cache.get(&key);
                }
            }));
        }
        for task in tasks {
            task.await.expect("worker panicked");
        }
        assert_eq!(cache.len(), 40);
        assert_eq!(cache.stats().insertions, 400);
    }

    fn first_stop(value: &CachedValue) -> u64 {
        match value {
            CachedValue::StopList(stops) => stops.first().map(|s| s.stop_id).unwrap_or(0),
            _ => 0,
        }
    }

    #[test]
    fn test_put_if_keeps_live_entry_when_refused() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache_with(clock.clone(), None);

        assert!(cache.put_if("k", stops(&[5]), |_| false), "vacant key is always stored");
        assert!(!cache.put_if("k", stops(&[3]), |current| first_stop(current) < 3));
        assert_eq!(cache.get("k").as_ref().map(first_stop), Some(5));
        assert!(cache.put_if("k", stops(&[8]), |current| first_stop(current) < 8));
        assert_eq!(cache.get("k").as_ref().map(first_stop), Some(8));

        clock.advance(TTL + Duration::from_secs(1));
        assert!(cache.put_if("k", stops(&[1]), |_| false), "stale entry is replaced");
        assert_eq!(cache.get("k").as_ref().map(first_stop), Some(1));
        assert_eq!(cache.stats().insertions, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_put_if_keeps_highest() {
        let cache = Arc::new(cache_with(Arc::new(ManualClock::new(0)), None));
        let mut tasks = Vec::new();
        for worker in 0..8u64 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                for n in 0..100u64 {
                    let candidate = n * 8 + worker;
                    cache.put_if("vehicle:bus-1", stops(&[candidate]), |current| {
                        first_stop(current) <= candidate
                    });
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.expect("worker panicked");
        }
        assert_eq!(cache.get("vehicle:bus-1").as_ref().map(first_stop), Some(99 * 8 + 7));
    }
}
