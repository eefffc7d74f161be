use crate::events::BusEvent;
use async_trait::async_trait;
use std::time::Duration;

/// "Send this structured message to this remote endpoint."
///
/// Implementations own the transport. The router treats any error, and any
/// call that outlives the delivery timeout, as a failed delivery.
#[async_trait]
pub trait RemoteSubscriber: Send + Sync + std::fmt::Debug {
    async fn deliver(&self, event: &BusEvent) -> Result<(), DeliveryError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Why a single delivery failed.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The endpoint is gone and will not come back
    #[error("Subscriber disconnected: {0}")]
    Disconnected(String),
    /// The endpoint is alive but refused the event (full queue, overload)
    #[error("Subscriber rejected event: {0}")]
    Rejected(String),
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}
