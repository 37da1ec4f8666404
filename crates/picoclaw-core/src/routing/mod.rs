//! Channel → workspace routing: the table, the pure resolver, and the
//! errors raised while validating or reloading either.

pub mod error;
pub mod resolver;
pub mod types;

pub use error::RoutingError;
pub use resolver::{session_key, RoutingResolver, INTERNAL_CHANNEL};
pub use types::{Decision, DecisionEvent, RoutingConfig, RoutingMapping, UnmappedBehavior};
