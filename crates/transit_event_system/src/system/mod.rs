/// Event bus module - split into registry, publication and statistics
mod core;
mod emitters;
mod handlers;
mod stats;

pub use core::{EventBus, HandlerId};
pub use stats::EventBusStats;
