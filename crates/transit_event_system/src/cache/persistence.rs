//! Atomic on-disk snapshots of the cache.
//!
//! Document layout:
//!
//! ```json
//! {
//!   "formatVersion": 1,
//!   "savedAtEpochMillis": 1700000000000,
//!   "entries": {
//!     "vehicle:bus-7": {
//!       "timestampEpochMillis": 1699999990000,
//!       "typeTag": "vehicle_position",
//!       "serializedValue": { "...": "..." }
//!     }
//!   }
//! }
//! ```
//!
//! Saving writes `<path>.tmp`, fsyncs it and renames it over `<path>`, so a
//! reader never observes a half-written snapshot. Loading decodes every entry
//! on its own: an entry that fails to parse or decode is skipped, not the
//! whole file.

use super::{CacheEntry, CacheError, CacheValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Current snapshot document version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One persisted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub timestamp_epoch_millis: u64,
    pub type_tag: String,
    pub serialized_value: serde_json::Value,
}

/// The full persisted document. Entries are kept as raw JSON so that a single
/// malformed entry cannot fail deserialization of the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub format_version: u32,
    pub saved_at_epoch_millis: u64,
    pub entries: BTreeMap<String, serde_json::Value>,
}

/// Result of reading a snapshot: decoded entries plus the number skipped.
#[derive(Debug)]
pub struct LoadedSnapshot<V> {
    pub saved_at_epoch_millis: u64,
    pub entries: Vec<(String, CacheEntry<V>)>,
    pub skipped: usize,
}

impl<V> Default for LoadedSnapshot<V> {
    fn default() -> Self {
        Self {
            saved_at_epoch_millis: 0,
            entries: Vec::new(),
            skipped: 0,
        }
    }
}

/// Single-writer snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp file in the same directory, so the final rename never
    /// crosses filesystems.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cache-snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Encodes `entries` into a snapshot document. Entries whose value cannot
    /// be encoded are skipped and logged.
    pub fn build_snapshot<'a, V, I>(entries: I, saved_at_epoch_millis: u64) -> CacheSnapshot
    where
        V: CacheValue,
        I: IntoIterator<Item = (&'a str, &'a CacheEntry<V>)>,
    {
        let mut encoded = BTreeMap::new();
        for (key, entry) in entries {
            let value = match entry.value.encode() {
                Ok(value) => value,
                Err(e) => {
                    warn!("⚠️ Not persisting cache entry '{}': {}", key, e);
                    continue;
                }
            };
            let record = SnapshotEntry {
                timestamp_epoch_millis: entry.inserted_at,
                type_tag: entry.type_tag().to_string(),
                serialized_value: value,
            };
            match serde_json::to_value(record) {
                Ok(json) => {
                    encoded.insert(key.to_string(), json);
                }
                Err(e) => warn!("⚠️ Not persisting cache entry '{}': {}", key, e),
            }
        }

        CacheSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at_epoch_millis,
            entries: encoded,
        }
    }

    /// Writes the snapshot atomically: temp file, fsync, rename.
    pub async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        let temp = self.write_temp(snapshot).await?;
        self.commit(&temp).await?;
        info!(
            "💾 Saved cache snapshot with {} entries to {}",
            snapshot.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    /// First half of [`save`](Self::save): the document is durable in the temp
    /// file but not yet visible at the snapshot path.
    pub(crate) async fn write_temp(&self, snapshot: &CacheSnapshot) -> Result<PathBuf, CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        debug!("Wrote {} bytes to {}", bytes.len(), temp.display());
        Ok(temp)
    }

    /// Second half of [`save`](Self::save): atomically replaces the snapshot.
    pub(crate) async fn commit(&self, temp: &Path) -> Result<(), CacheError> {
        tokio::fs::rename(temp, &self.path).await?;
        Ok(())
    }

    /// Reads and decodes the snapshot.
    ///
    /// A missing file is a normal cold start. An unreadable file, an
    /// unparseable document or an unknown format version is logged and treated
    /// the same way. Individual entries that cannot be decoded are counted in
    /// `skipped`. TTL is not applied here; the cache manager filters the
    /// returned entries against its own policy and clock.
    pub async fn load<V: CacheValue>(&self) -> LoadedSnapshot<V> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📭 No cache snapshot at {}, starting empty", self.path.display());
                return LoadedSnapshot::default();
            }
            Err(e) => {
                warn!("⚠️ Cannot read cache snapshot {}: {}", self.path.display(), e);
                return LoadedSnapshot::default();
            }
        };

        let snapshot: CacheSnapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("⚠️ Cache snapshot {} is not a valid document: {}", self.path.display(), e);
                return LoadedSnapshot::default();
            }
        };

        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            let e = CacheError::UnsupportedVersion {
                found: snapshot.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            };
            warn!("⚠️ Ignoring cache snapshot {}: {}", self.path.display(), e);
            return LoadedSnapshot::default();
        }

        let mut loaded = LoadedSnapshot {
            saved_at_epoch_millis: snapshot.saved_at_epoch_millis,
            entries: Vec::with_capacity(snapshot.entries.len()),
            skipped: 0,
        };

        for (key, raw) in snapshot.entries {
            match decode_entry::<V>(raw) {
                Ok(entry) => loaded.entries.push((key, entry)),
                Err(e) => {
                    warn!("⚠️ Skipping cache snapshot entry '{}': {}", key, e);
                    loaded.skipped += 1;
                }
            }
        }
        loaded
    }
}

fn decode_entry<V: CacheValue>(raw: serde_json::Value) -> Result<CacheEntry<V>, CacheError> {
    let record: SnapshotEntry = serde_json::from_value(raw)?;
    let value = V::decode(&record.type_tag, record.serialized_value)?;
    Ok(CacheEntry::new(value, record.timestamp_epoch_millis))
}
