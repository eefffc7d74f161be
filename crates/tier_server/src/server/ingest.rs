//! Record ingestion: enrich, publish locally, forward downstream.

use super::core::TierController;
use crate::{
    collaborators::{RecordSource, TelemetryRecord},
    error::TierError,
    query::STOPS_KEY,
};
use transit_event_system::{BusEvent, CachedValue, Coordinate, DeliveryReport, EnrichedEvent, Stop};
use tracing::{debug, info, trace, warn};

/// What happened to one ingested record.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub event: EnrichedEvent,
    pub delivery: DeliveryReport,
}

/// Totals of one [`TierController::run_source`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub ingested: u64,
    pub rejected: u64,
    /// True when the run ended because shutdown was initiated
    pub interrupted: bool,
}

impl TierController {
    /// Enriches one record and pushes it through the tier.
    ///
    /// When fewer than two stops are known the event is still published with
    /// its zone; only the arc (and possibly the nearest stop) is left empty.
    pub async fn ingest(&self, record: TelemetryRecord) -> Result<IngestOutcome, TierError> {
        if self.shutdown_state.is_shutdown_initiated() {
            return Err(TierError::ShuttingDown);
        }
        validate(&record)?;

        let stops = self.known_stops().await;
        let event = self.enrich(record, &stops);
        trace!(
            "Enriched {}#{} -> {} arc {:?}",
            event.source_id,
            event.sequence_id,
            event.zone_id,
            event.arc_id
        );

        let bus_event = BusEvent::from(event.clone());
        self.bus.publish(bus_event.clone()).await;
        let delivery = self.router.forward(&bus_event).await;
        Ok(IngestOutcome { event, delivery })
    }

    /// Drains `source` until it is exhausted or shutdown is initiated.
    ///
    /// Invalid records are logged and counted; a failing source ends the run
    /// with its error.
    pub async fn run_source(&self, source: &mut dyn RecordSource) -> Result<IngestSummary, TierError> {
        let mut summary = IngestSummary::default();
        info!("📥 {} tier reading records from {}", self.config.role, source.name());

        loop {
            let next = tokio::select! {
                next = source.next_record() => next?,
                _ = self.shutdown_state.wait() => {
                    summary.interrupted = true;
                    break;
                }
            };
            let Some(record) = next else { break };

            match self.ingest(record).await {
                Ok(_) => summary.ingested += 1,
                Err(TierError::ShuttingDown) => {
                    summary.interrupted = true;
                    break;
                }
                Err(e) => {
                    summary.rejected += 1;
                    warn!("⚠️ Dropping record from {}: {}", source.name(), e);
                }
            }
        }

        info!(
            "📊 {} finished: {} ingested, {} rejected{}",
            source.name(),
            summary.ingested,
            summary.rejected,
            if summary.interrupted { " (interrupted)" } else { "" }
        );
        Ok(summary)
    }

    /// Known stops, read through the cache. A failing directory degrades to
    /// "no stops", which in turn degrades enrichment to zone-only.
    pub async fn known_stops(&self) -> Vec<Stop> {
        let directory = self.stops.clone();
        let lookup = self
            .cache
            .get_or_resolve(STOPS_KEY, || async move {
                match directory.known_stops().await {
                    Ok(stops) => Some(CachedValue::StopList(stops)),
                    Err(e) => {
                        warn!("⚠️ Stop directory unavailable: {}", e);
                        None
                    }
                }
            })
            .await;

        match lookup.value {
            Some(CachedValue::StopList(stops)) => stops,
            Some(other) => {
                debug!("Unexpected {:?} under {}, ignoring", other, STOPS_KEY);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    fn enrich(&self, record: TelemetryRecord, stops: &[Stop]) -> EnrichedEvent {
        let (lat, lon) = (record.latitude, record.longitude);
        let (zone_id, arc_id, nearest_stop_id) = match self.resolver.resolve(lat, lon, stops) {
            Some(resolution) => (
                resolution.zone_id,
                Some(resolution.arc_id),
                Some(resolution.nearest_stop_id),
            ),
            None => (
                self.resolver.zone_for(lat, lon),
                None,
                self.resolver.nearest_stop(lat, lon, stops).map(|stop| stop.stop_id),
            ),
        };

        EnrichedEvent {
            source_id: record.source_id,
            line_id: record.line_id,
            coordinate: Coordinate::new(lat, lon),
            zone_id,
            arc_id,
            nearest_stop_id,
            event_timestamp: record.timestamp,
            sequence_id: record.sequence_id,
        }
    }
}

fn validate(record: &TelemetryRecord) -> Result<(), TierError> {
    if record.source_id.trim().is_empty() {
        return Err(TierError::InvalidRecord("empty source id".to_string()));
    }
    if !record.latitude.is_finite() || !record.longitude.is_finite() {
        return Err(TierError::InvalidRecord(format!(
            "non-finite coordinate ({}, {}) from {}",
            record.latitude, record.longitude, record.source_id
        )));
    }
    Ok(())
}
