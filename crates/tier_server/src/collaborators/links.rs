use crate::error::TierError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use transit_event_system::{
    BusEvent, DeliveryError, EventRouter, RemoteSubscriber, RouterState, RoutingError,
};

/// A downstream client backed by a bounded queue.
///
/// Stands in for a dashboard or operator console connection: the router
/// pushes into the queue and the client drains it at its own pace. A full
/// queue rejects the event; a dropped receiver reports the client as gone.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    name: String,
    sender: mpsc::Sender<BusEvent>,
}

impl ChannelSubscriber {
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<BusEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                sender,
            },
            receiver,
        )
    }
}

#[async_trait]
impl RemoteSubscriber for ChannelSubscriber {
    async fn deliver(&self, event: &BusEvent) -> Result<(), DeliveryError> {
        self.sender.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Rejected(format!("{} queue is full", self.name)),
            TrySendError::Closed(_) => DeliveryError::Disconnected(self.name.clone()),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-process link that feeds one tier's output into the next tier's router.
///
/// Registered as a subscriber on the upper tier. Deliveries only enqueue; a
/// drain task owned by the link hands events to
/// [`EventRouter::receive_from_upstream`] on the lower tier in arrival order,
/// so a slow client further down never counts against the upper tier's
/// delivery timeout. The task ends once every handle to the link is dropped.
#[derive(Debug, Clone)]
pub struct TierLink {
    name: String,
    downstream: Arc<EventRouter>,
    sender: mpsc::Sender<BusEvent>,
}

impl TierLink {
    /// Creates the link and spawns its drain task on the current runtime.
    pub fn spawn(downstream: Arc<EventRouter>, capacity: usize) -> Result<Self, TierError> {
        let runtime = Handle::try_current()
            .map_err(|e| TierError::Collaborator(format!("tier link needs a tokio runtime: {e}")))?;
        let name = format!("{}-tier-link", downstream.tier());
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        runtime.spawn(drain_into(name.clone(), downstream.clone(), receiver));

        Ok(Self {
            name,
            downstream,
            sender,
        })
    }
}

async fn drain_into(name: String, downstream: Arc<EventRouter>, mut receiver: mpsc::Receiver<BusEvent>) {
    while let Some(event) = receiver.recv().await {
        match downstream.receive_from_upstream(event).await {
            Ok(_) => {}
            Err(RoutingError::NotStarted(state)) => debug!("🔗 {} dropped event, downstream is {}", name, state),
            Err(e) => warn!("⚠️ {} failed to hand off event: {}", name, e),
        }
    }
    debug!("🔗 {} closed", name);
}

#[async_trait]
impl RemoteSubscriber for TierLink {
    async fn deliver(&self, event: &BusEvent) -> Result<(), DeliveryError> {
        let state = self.downstream.state();
        if state == RouterState::Stopped {
            return Err(DeliveryError::Disconnected(format!("{} is {}", self.name, state)));
        }
        self.sender.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Rejected(format!("{} queue is full", self.name)),
            TrySendError::Closed(_) => DeliveryError::Disconnected(self.name.clone()),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
