//! Downstream client admission.

use super::core::{ClientSession, TierController};
use crate::error::TierError;
use std::sync::Arc;
use tracing::info;
use transit_event_system::{ClientId, Interest, RemoteSubscriber, RoutingError};

impl TierController {
    /// Admits a dashboard or operator client.
    ///
    /// With a session authority configured the token must validate, and the
    /// subscription is narrowed to the zones the session is entitled to.
    /// Without one, the requested interest is taken as is. Each admitted
    /// client counts towards the active-connection gauge until
    /// [`disconnect_client`](Self::disconnect_client).
    pub async fn connect_client(
        &self,
        token: &str,
        requested: Interest,
        endpoint: Arc<dyn RemoteSubscriber>,
    ) -> Result<ClientId, TierError> {
        let (subject, entitled) = match &self.sessions {
            Some(sessions) => {
                let entitlement = sessions.validate(token).await.ok_or(TierError::Unauthorized)?;
                (entitlement.subject, entitlement.zones)
            }
            None => (endpoint.name().to_string(), Interest::All),
        };

        let interest = requested.intersect(&entitled);
        if interest.is_empty() {
            return Err(TierError::Forbidden);
        }

        let client_id = ClientId::new();
        self.router.subscribe(client_id, interest.clone(), endpoint)?;
        self.clients.insert(client_id, ClientSession { subject: subject.clone(), entitled });
        self.statistics.global().increment_connections();
        info!("🔗 {} connected to {} tier as {} with {}", subject, self.config.role, client_id, interest);
        Ok(client_id)
    }

    /// Removes an admitted client. Returns false if it was not connected.
    pub fn disconnect_client(&self, client_id: &ClientId) -> bool {
        self.router.unsubscribe(client_id);
        match self.clients.remove(client_id) {
            Some((_, session)) => {
                self.statistics.global().decrement_connections();
                info!("❌ {} ({}) disconnected from {} tier", session.subject, client_id, self.config.role);
                true
            }
            None => false,
        }
    }

    /// Moves a client to a new zone set, bounded by its entitlement.
    pub fn reassign_client(&self, client_id: &ClientId, requested: Interest) -> Result<Interest, TierError> {
        let entitled = self
            .clients
            .get(client_id)
            .map(|session| session.entitled.clone())
            .ok_or(TierError::Routing(RoutingError::UnknownClient(*client_id)))?;
        let interest = requested.intersect(&entitled);
        if interest.is_empty() {
            return Err(TierError::Forbidden);
        }
        self.router.reconfigure(client_id, interest.clone())?;
        Ok(interest)
    }

    /// Subscribes the next tier (or any internal consumer) to everything this
    /// tier forwards. Links bypass session checks and the connection gauge.
    pub fn attach_downstream(
        &self,
        interest: Interest,
        endpoint: Arc<dyn RemoteSubscriber>,
    ) -> Result<ClientId, TierError> {
        let client_id = ClientId::new();
        self.router.subscribe(client_id, interest, endpoint)?;
        Ok(client_id)
    }

    /// Releases the connection slot of clients the router dropped as
    /// unreachable. Returns how many were released.
    pub fn prune_disconnected(&self) -> usize {
        let gone: Vec<ClientId> = self
            .clients
            .iter()
            .map(|entry| *entry.key())
            .filter(|client_id| !self.router.subscriptions().contains(client_id))
            .collect();
        gone.iter().filter(|client_id| self.disconnect_client(client_id)).count()
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.len()
    }
}
