//! # TTL Result Cache
//!
//! The cache a tier uses to answer expensive lookups (latest vehicle position,
//! the known-stop list, zone statistics) without going upstream every time.
//!
//! It is composed of three parts:
//!
//! - **Storage** - a concurrent key → [`CacheEntry`] map (DashMap, no
//!   ordering guarantee, unique keys, re-insertion replaces)
//! - **Policy** - an [`EvictionPolicy`]; the base design is [`TtlPolicy`],
//!   a single TTL for the whole cache instance, applied lazily on read
//! - **Persistence** - a [`SnapshotStore`] that writes the full entry set to a
//!   versioned JSON document through a temp file + atomic rename, and reads it
//!   back entry by entry, dropping expired or undecodable entries
//!
//! Values are a closed set of kinds ([`CachedValue`]); each kind has its own
//! serialized shape and the stored type tag selects the decoder on load.

mod entry;
mod manager;
mod persistence;
mod policy;
mod value;

pub use entry::CacheEntry;
pub use manager::{CacheConfig, CacheLookup, CacheManager, CacheStats, RestoreReport};
pub use persistence::{CacheSnapshot, LoadedSnapshot, SnapshotEntry, SnapshotStore, SNAPSHOT_FORMAT_VERSION};
pub use policy::{EvictionPolicy, TtlPolicy};
pub use value::{CacheValue, CachedValue};

/// Errors raised by the cache and its persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown cache value type tag: {0}")]
    UnknownTypeTag(String),
    #[error("Failed to decode '{tag}' value: {source}")]
    Decode {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}
