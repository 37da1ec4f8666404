//! Async message bus — the central nervous system of Picoclaw.

pub mod queue;
pub mod types;

pub use queue::{shared, MessageBus, PublishError};
pub use types::{InboundMessage, OutboundMessage};
