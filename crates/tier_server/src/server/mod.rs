//! Tier controller and its lifecycle, ingestion and client admission.

pub mod core;
mod clients;
mod ingest;

pub use core::TierController;
pub use ingest::{IngestOutcome, IngestSummary};
