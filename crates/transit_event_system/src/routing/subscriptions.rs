use super::{Interest, RemoteSubscriber};
use crate::types::{ClientId, SubscriptionId, ZoneId};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A registered downstream client.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub client_id: ClientId,
    pub interest: Interest,
    pub endpoint: Arc<dyn RemoteSubscriber>,
    /// Failed deliveries since the last success
    pub consecutive_failures: u32,
}

/// Interest registry of one router.
///
/// Keyed by client id; subscribing again with the same id replaces the
/// previous interest set and endpoint.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    subscriptions: DashMap<ClientId, Subscription>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        client_id: ClientId,
        interest: Interest,
        endpoint: Arc<dyn RemoteSubscriber>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        info!("📡 Client {} ({}) subscribed to {}", client_id, endpoint.name(), interest);
        self.subscriptions.insert(
            client_id,
            Subscription {
                id,
                client_id,
                interest,
                endpoint,
                consecutive_failures: 0,
            },
        );
        id
    }

    pub fn unsubscribe(&self, client_id: &ClientId) -> Option<Subscription> {
        let removed = self.subscriptions.remove(client_id).map(|(_, sub)| sub);
        if removed.is_some() {
            info!("📴 Client {} unsubscribed", client_id);
        }
        removed
    }

    /// Swaps the interest set of an existing client. Returns false when the
    /// client is unknown.
    pub fn set_interest(&self, client_id: &ClientId, interest: Interest) -> bool {
        match self.subscriptions.get_mut(client_id) {
            Some(mut sub) => {
                debug!("Client {} interest {} -> {}", client_id, sub.interest, interest);
                sub.interest = interest;
                true
            }
            None => false,
        }
    }

    pub fn interest_of(&self, client_id: &ClientId) -> Option<Interest> {
        self.subscriptions.get(client_id).map(|sub| sub.interest.clone())
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.subscriptions.contains_key(client_id)
    }

    /// Endpoints of the clients interested in `zone`; every client when
    /// `zone` is `None`.
    pub fn targets(&self, zone: Option<&ZoneId>) -> Vec<(ClientId, Arc<dyn RemoteSubscriber>)> {
        self.subscriptions
            .iter()
            .filter(|sub| zone.map_or(true, |z| sub.interest.matches(z)))
            .map(|sub| (sub.client_id, sub.endpoint.clone()))
            .collect()
    }

    pub fn record_success(&self, client_id: &ClientId) {
        if let Some(mut sub) = self.subscriptions.get_mut(client_id) {
            sub.consecutive_failures = 0;
        }
    }

    /// Counts a failed delivery and removes the client once `threshold`
    /// consecutive failures are reached. Returns true if it was removed.
    pub fn record_failure(&self, client_id: &ClientId, threshold: u32) -> bool {
        let reached = match self.subscriptions.get_mut(client_id) {
            Some(mut sub) => {
                sub.consecutive_failures += 1;
                sub.consecutive_failures >= threshold
            }
            None => return false,
        };
        reached
            && self
                .subscriptions
                .remove_if(client_id, |_, sub| sub.consecutive_failures >= threshold)
                .is_some()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn clients(&self) -> Vec<ClientId> {
        self.subscriptions.iter().map(|sub| sub.client_id).collect()
    }
}
