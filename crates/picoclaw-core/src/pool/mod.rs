//! Agent-loop pool & dispatcher — fan-out of inbound messages to
//! per-workspace workers, keyed by canonicalized workspace path.

pub mod dispatcher;
pub mod workspace_pool;

pub use dispatcher::Dispatcher;
pub use workspace_pool::{AgentLoopPool, PoolError, TurnHandler, TurnHandlerFactory, DEFAULT_WORKSPACE_QUEUE_SIZE};
