use crate::error::TierError;
use async_trait::async_trait;
use std::path::Path;
use transit_event_system::Stop;

/// Reference data: the stops the resolver may pick arcs from.
#[async_trait]
pub trait StopDirectory: Send + Sync + std::fmt::Debug {
    async fn known_stops(&self) -> Result<Vec<Stop>, TierError>;
}

/// A fixed stop list, in memory or loaded once from a JSON array file.
#[derive(Debug, Clone, Default)]
pub struct StaticStopDirectory {
    stops: Vec<Stop>,
}

impl StaticStopDirectory {
    pub fn new(stops: Vec<Stop>) -> Self {
        Self { stops }
    }

    /// Reads `[{"stop_id": 1, "latitude": 3.4, "longitude": -76.5}, ...]`.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TierError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TierError::Collaborator(format!("cannot read {}: {e}", path.display())))?;
        let stops: Vec<Stop> = serde_json::from_slice(&bytes)
            .map_err(|e| TierError::Collaborator(format!("invalid stop file {}: {e}", path.display())))?;
        Ok(Self::new(stops))
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

#[async_trait]
impl StopDirectory for StaticStopDirectory {
    async fn known_stops(&self) -> Result<Vec<Stop>, TierError> {
        Ok(self.stops.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_from_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stops.json");
        tokio::fs::write(
            &path,
            r#"[{"stop_id":500007,"latitude":3.401,"longitude":-76.501},{"stop_id":500042,"latitude":3.399,"longitude":-76.4985}]"#,
        )
        .await
        .unwrap();

        let directory = StaticStopDirectory::from_json_file(&path).await.expect("load");
        let stops = directory.known_stops().await.unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[1].stop_id, 500_042);
    }

    #[tokio::test]
    async fn test_invalid_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stops.json");
        tokio::fs::write(&path, "{}").await.unwrap();
        assert!(StaticStopDirectory::from_json_file(&path).await.is_err());
    }
}
