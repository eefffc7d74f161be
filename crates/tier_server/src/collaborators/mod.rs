//! External collaborators of a tier and their local implementations.
//!
//! The pipeline only depends on the traits defined here. Transports,
//! databases and identity providers live behind them.
//!
//! | trait | local implementation |
//! |-------|----------------------|
//! | [`RecordSource`] | [`JsonLinesRecordSource`], [`MemoryRecordSource`] |
//! | [`StopDirectory`] | [`StaticStopDirectory`] |
//! | [`SessionAuthority`] | [`StaticSessionAuthority`] |
//! | [`RemoteSubscriber`](transit_event_system::RemoteSubscriber) | [`ChannelSubscriber`], [`TierLink`] |

mod links;
mod records;
mod sessions;
mod stops;

pub use links::{ChannelSubscriber, TierLink};
pub use records::{JsonLinesRecordSource, MemoryRecordSource, RecordSource, TelemetryRecord};
pub use sessions::{Entitlement, SessionAuthority, StaticSessionAuthority};
pub use stops::{StaticStopDirectory, StopDirectory};
