use crate::error::TierError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, warn};

/// Raw enrichment input as delivered by the ingestion side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub source_id: String,
    pub line_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix epoch milliseconds
    pub timestamp: u64,
    /// Datagram number, monotonic per source
    pub sequence_id: u64,
}

/// A producer of enrichment-input records.
///
/// Whether records are polled from a database or pushed over the network is
/// the implementation's business; the tier just asks for the next one.
#[async_trait]
pub trait RecordSource: Send + std::fmt::Debug {
    /// Next record, or `None` once the source is exhausted.
    async fn next_record(&mut self) -> Result<Option<TelemetryRecord>, TierError>;

    fn name(&self) -> &str;
}

/// Replays records from a file with one JSON object per line.
///
/// Blank lines are ignored; lines that do not parse are logged and skipped.
#[derive(Debug)]
pub struct JsonLinesRecordSource {
    path: PathBuf,
    lines: Lines<BufReader<tokio::fs::File>>,
    replay_interval: Option<Duration>,
    line_number: usize,
    emitted: usize,
    skipped: usize,
}

impl JsonLinesRecordSource {
    /// Opens `path`. With a `replay_interval`, each record after the first is
    /// delayed by that long to mimic a live feed.
    pub async fn open(path: impl AsRef<Path>, replay_interval: Option<Duration>) -> Result<Self, TierError> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| TierError::Collaborator(format!("cannot open {}: {e}", path.display())))?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            replay_interval,
            line_number: 0,
            emitted: 0,
            skipped: 0,
        })
    }

    /// Lines skipped so far because they did not parse.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[async_trait]
impl RecordSource for JsonLinesRecordSource {
    async fn next_record(&mut self) -> Result<Option<TelemetryRecord>, TierError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| TierError::Collaborator(format!("read error in {}: {e}", self.path.display())))?;
            let Some(line) = line else {
                debug!("Record source {} exhausted after {} lines", self.path.display(), self.line_number);
                return Ok(None);
            };
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryRecord>(trimmed) {
                Ok(record) => {
                    if let (Some(interval), true) = (self.replay_interval, self.emitted > 0) {
                        tokio::time::sleep(interval).await;
                    }
                    self.emitted += 1;
                    return Ok(Some(record));
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!("⚠️ Skipping line {} of {}: {}", self.line_number, self.path.display(), e);
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.path.to_str().unwrap_or("jsonl")
    }
}

/// Hands out a fixed list of records.
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    records: VecDeque<TelemetryRecord>,
}

impl MemoryRecordSource {
    pub fn new(records: impl IntoIterator<Item = TelemetryRecord>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn next_record(&mut self) -> Result<Option<TelemetryRecord>, TierError> {
        Ok(self.records.pop_front())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_jsonl_source_skips_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"{{"source_id":"bus-1","line_id":"T31","latitude":3.4,"longitude":-76.5,"timestamp":1000,"sequence_id":1}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(
            file,
            r#"{{"source_id":"bus-2","line_id":"E21","latitude":3.45,"longitude":-76.52,"timestamp":2000,"sequence_id":7}}"#
        )
        .unwrap();

        let mut source = JsonLinesRecordSource::open(file.path(), None).await.expect("open");
        let first = source.next_record().await.unwrap().expect("first record");
        let second = source.next_record().await.unwrap().expect("second record");

        assert_eq!(first.source_id, "bus-1");
        assert_eq!(second.sequence_id, 7);
        assert!(source.next_record().await.unwrap().is_none());
        assert_eq!(source.skipped(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_collaborator_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = JsonLinesRecordSource::open(dir.path().join("absent.jsonl"), None).await;
        assert!(matches!(result, Err(TierError::Collaborator(_))));
    }

    #[tokio::test]
    async fn test_memory_source_drains_in_order() {
        let record = |seq| TelemetryRecord {
            source_id: "bus-9".to_string(),
            line_id: "A1".to_string(),
            latitude: 3.4,
            longitude: -76.5,
            timestamp: 0,
            sequence_id: seq,
        };
        let mut source = MemoryRecordSource::new([record(1), record(2)]);
        assert_eq!(source.next_record().await.unwrap().map(|r| r.sequence_id), Some(1));
        assert_eq!(source.next_record().await.unwrap().map(|r| r.sequence_id), Some(2));
        assert!(source.next_record().await.unwrap().is_none());
    }
}
