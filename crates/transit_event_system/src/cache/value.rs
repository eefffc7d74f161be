//! Cacheable value kinds.

use super::CacheError;
use crate::analytics::StatSnapshot;
use crate::events::EnrichedEvent;
use crate::types::Stop;
use serde::{Deserialize, Serialize};

/// A value the cache can store and persist.
///
/// `encode` produces the kind-specific serialized shape; `decode` must use the
/// stored `type_tag` to pick the decoder and fail (for that entry only) when
/// the shape does not match.
pub trait CacheValue: Clone + Send + Sync + std::fmt::Debug + 'static {
    fn type_tag(&self) -> &'static str;

    fn encode(&self) -> Result<serde_json::Value, CacheError>;

    fn decode(type_tag: &str, value: serde_json::Value) -> Result<Self, CacheError>
    where
        Self: Sized;
}

/// Values cached by the pipeline's query surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CachedValue {
    /// Latest enriched event for one source
    VehiclePosition(EnrichedEvent),
    /// Known stops from the reference-data collaborator
    StopList(Vec<Stop>),
    /// Counters for one zone or for the whole tier
    ZoneStatistics(StatSnapshot),
}

impl CachedValue {
    pub const VEHICLE_POSITION: &'static str = "vehicle_position";
    pub const STOP_LIST: &'static str = "stop_list";
    pub const ZONE_STATISTICS: &'static str = "zone_statistics";
}

fn decode_as<T: serde::de::DeserializeOwned>(tag: &str, value: serde_json::Value) -> Result<T, CacheError> {
    serde_json::from_value(value).map_err(|source| CacheError::Decode {
        tag: tag.to_string(),
        source,
    })
}

impl CacheValue for CachedValue {
    fn type_tag(&self) -> &'static str {
        match self {
            CachedValue::VehiclePosition(_) => Self::VEHICLE_POSITION,
            CachedValue::StopList(_) => Self::STOP_LIST,
            CachedValue::ZoneStatistics(_) => Self::ZONE_STATISTICS,
        }
    }

    fn encode(&self) -> Result<serde_json::Value, CacheError> {
        let encoded = match self {
            CachedValue::VehiclePosition(event) => serde_json::to_value(event)?,
            CachedValue::StopList(stops) => serde_json::to_value(stops)?,
            CachedValue::ZoneStatistics(stats) => serde_json::to_value(stats)?,
        };
        Ok(encoded)
    }

    fn decode(type_tag: &str, value: serde_json::Value) -> Result<Self, CacheError> {
        match type_tag {
            Self::VEHICLE_POSITION => decode_as(type_tag, value).map(CachedValue::VehiclePosition),
            Self::STOP_LIST => decode_as(type_tag, value).map(CachedValue::StopList),
            Self::ZONE_STATISTICS => decode_as(type_tag, value).map(CachedValue::ZoneStatistics),
            other => Err(CacheError::UnknownTypeTag(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_uses_tag() {
        let stops = CachedValue::StopList(vec![Stop::new(1, 3.4, -76.5), Stop::new(2, 3.41, -76.51)]);
        let encoded = stops.encode().expect("encode");
        assert!(encoded.is_array());
        let decoded = CachedValue::decode(stops.type_tag(), encoded).expect("decode");
        assert_eq!(decoded, stops);
    }

    #[test]
    fn test_wrong_decoder_fails() {
        let stops = CachedValue::StopList(vec![Stop::new(1, 3.4, -76.5)]);
        let encoded = stops.encode().expect("encode");
        let err = CachedValue::decode(CachedValue::ZONE_STATISTICS, encoded).unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));
    }

    #[test]
    fn test_unknown_tag_fails() {
        let err = CachedValue::decode("weather", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, CacheError::UnknownTypeTag(tag) if tag == "weather"));
    }
}
