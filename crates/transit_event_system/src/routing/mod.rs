//! # Multi-hop Subscription Routing
//!
//! Every tier runs one [`EventRouter`]. The router owns a
//! [`SubscriptionManager`] holding the interest sets of its downstream
//! clients and forwards events to them through the abstract
//! [`RemoteSubscriber`] capability. A tier is at the same time a subscriber
//! of the tier above (through [`EventRouter::receive_from_upstream`]) and a
//! publisher to the tier below, which is how the origin → mid → terminal
//! chain is assembled.
//!
//! ## Router lifecycle
//!
//! ```text
//! Stopped ──start──▶ Started ──disable_filtering──▶ Reconfiguring
//!    ▲                 │  ▲                              │
//!    └──────stop───────┘  └───────enable_filtering───────┘
//! ```
//!
//! `disable_filtering` calls nest: the router returns to `Started` once each
//! of them has been matched by `enable_filtering`.
//!
//! Inbound events are published and forwarded only in `Started`. In
//! `Reconfiguring` they are acknowledged and counted but not delivered. In
//! `Stopped` they are rejected.
//!
//! ## Delivery
//!
//! Each subscriber call runs under its own timeout and all calls of one route
//! operation run concurrently, so a slow subscriber never holds up the
//! others. Subscribers that keep failing are dropped from the registry.

mod interest;
mod router;
mod subscriber;
mod subscriptions;

pub use interest::Interest;
pub use router::{DeliveryReport, EventRouter, RouterConfig, RouterState, RouterStats};
pub use subscriber::{DeliveryError, RemoteSubscriber};
pub use subscriptions::{Subscription, SubscriptionManager};

use crate::types::ClientId;

/// Errors raised by router operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoutingError {
    /// The operation needs a started router
    #[error("Router is {0}")]
    NotStarted(RouterState),
    /// A lifecycle transition was requested from the wrong state
    #[error("Cannot move router from {from} to {to}")]
    InvalidTransition { from: RouterState, to: RouterState },
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),
}

// Tests module
mod tests;
