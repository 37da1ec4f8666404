//! Turn-lifecycle hook pipeline: the seven fixed events, sequential
//! dispatch, the built-in `hooks.yaml` policy handler, and the JSONL
//! audit sink.

pub mod audit_sink;
pub mod pipeline;
pub mod policy;
pub mod types;

pub use audit_sink::AuditSink;
pub use pipeline::{HookHandler, HookPipeline};
pub use policy::{EventPolicy, PolicyHandler, PolicyModel};
pub use types::{AuditEntry, Event, HookContext, HookResult, HookStatus};
