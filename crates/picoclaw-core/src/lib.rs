//! Picoclaw Core — bus, config, session, routing, hooks, and worker pool.
//!
//! This crate has no dependency on any concrete LLM provider or channel
//! adapter; it defines the primitives those crates compose.

pub mod bus;
pub mod config;
pub mod heartbeat;
pub mod hooks;
pub mod identity;
pub mod pool;
pub mod routing;
pub mod session;
pub mod types;
pub mod utils;

pub use bus::queue::MessageBus;
pub use config::Config;
