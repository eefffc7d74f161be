use async_trait::async_trait;
use std::collections::HashMap;
use transit_event_system::Interest;

/// What a validated session may subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    /// Operator or dashboard identity, for logs
    pub subject: String,
    pub zones: Interest,
}

/// "Is this token valid, and which zones is it entitled to?"
#[async_trait]
pub trait SessionAuthority: Send + Sync + std::fmt::Debug {
    async fn validate(&self, token: &str) -> Option<Entitlement>;
}

/// Token table fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticSessionAuthority {
    tokens: HashMap<String, Entitlement>,
}

impl StaticSessionAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, entitlement: Entitlement) -> Self {
        self.tokens.insert(token.into(), entitlement);
        self
    }
}

#[async_trait]
impl SessionAuthority for StaticSessionAuthority {
    async fn validate(&self, token: &str) -> Option<Entitlement> {
        self.tokens.get(token).cloned()
    }
}
