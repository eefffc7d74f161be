//! Factory functions for assembling tiers.

use crate::{
    collaborators::{StaticStopDirectory, StopDirectory, TierLink},
    config::TierConfig,
    error::TierError,
    server::TierController,
};
use std::sync::Arc;
use transit_event_system::{ClientId, Interest, TierRole};

/// Creates a tier with default configuration for `role` and no known stops.
///
/// # Example
///
/// ```rust
/// use tier_server::create_tier;
/// use transit_event_system::TierRole;
///
/// let tier = create_tier(TierRole::Terminal).expect("default config is valid");
/// assert_eq!(tier.role(), TierRole::Terminal);
/// ```
pub fn create_tier(role: TierRole) -> Result<TierController, TierError> {
    create_tier_with_config(TierConfig::for_role(role), Arc::new(StaticStopDirectory::default()))
}

/// Creates a tier from explicit configuration and reference data.
pub fn create_tier_with_config(
    config: TierConfig,
    stops: Arc<dyn StopDirectory>,
) -> Result<TierController, TierError> {
    TierController::new(config, stops)
}

/// Subscribes `lower` to everything `upper` forwards within `interest`.
///
/// The hop is buffered by `lower`'s `subscriber_queue_capacity`; must be
/// called from within a tokio runtime.
pub fn link_tiers(
    upper: &TierController,
    lower: &TierController,
    interest: Interest,
) -> Result<ClientId, TierError> {
    let link = TierLink::spawn(lower.router(), lower.config().subscriber_queue_capacity)?;
    upper.attach_downstream(interest, Arc::new(link))
}
