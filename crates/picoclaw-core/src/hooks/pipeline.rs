//! Hook pipeline — sequential, timed dispatch of one of the seven fixed
//! lifecycle events to every registered handler, recording an
//! [`AuditEntry`] for each handler invocation regardless of status.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use super::audit_sink::AuditSink;
use super::types::{AuditEntry, Event, HookContext, HookResult};

/// A turn-lifecycle hook handler. Implementations MUST NOT block the
/// caller indefinitely — the pipeline times every call but does not
/// enforce a timeout itself (§4.5 leaves that to the handler).
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Stable name recorded on every [`AuditEntry`] this handler produces.
    fn name(&self) -> &str;

    /// Handle one event firing. Errors do not abort the turn; only the
    /// built-in policy handler's fatal-marking convention (unused by the
    /// default policy handler) could change that, per §4.5.
    async fn handle(&self, event: Event, ctx: &HookContext) -> HookResult;
}

/// Runs every registered [`HookHandler`] in registration order for each
/// event fired during a turn, and writes one [`AuditEntry`] per handler
/// invocation to the [`AuditSink`].
pub struct HookPipeline {
    handlers: Vec<Arc<dyn HookHandler>>,
    audit: Arc<AuditSink>,
    enabled: bool,
}

impl HookPipeline {
    pub fn new(audit: Arc<AuditSink>, enabled: bool) -> Self {
        Self {
            handlers: Vec::new(),
            audit,
            enabled,
        }
    }

    /// Register a handler. Handlers fire in the order they were
    /// registered, for every event.
    pub fn register(&mut self, handler: Arc<dyn HookHandler>) {
        self.handlers.push(handler);
    }

    /// Fire `event` against every registered handler, sequentially, timing
    /// each call and recording an audit entry regardless of status.
    ///
    /// When the pipeline is globally disabled (`hooks.enabled = false` in
    /// config), no handler runs but a single `skipped` audit entry is still
    /// recorded per spec §4.5's "master switch... audit sink still records
    /// a skipped entry for every event" contract.
    pub async fn fire(&self, event: Event, ctx: &HookContext) {
        if !self.enabled {
            let result = HookResult::ok("hook pipeline disabled").with_metadata("skipped", "true");
            self.audit
                .enqueue(AuditEntry::new(event, "pipeline", ctx, &result))
                .await;
            return;
        }

        for handler in &self.handlers {
            let started = Instant::now();
            let mut result = handler.handle(event, ctx).await;
            result.duration_ms = started.elapsed().as_millis() as u64;

            if matches!(result.status, super::types::HookStatus::Error) {
                warn!(
                    handler = handler.name(),
                    event = event.as_str(),
                    error = ?result.error,
                    "hook handler returned error status"
                );
            }

            self.audit
                .enqueue(AuditEntry::new(event, handler.name(), ctx, &result))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        name: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HookHandler for CountingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: Event, _ctx: &HookContext) -> HookResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            HookResult::ok("handled")
        }
    }

    struct ErroringHandler;

    #[async_trait]
    impl HookHandler for ErroringHandler {
        fn name(&self) -> &str {
            "erroring"
        }

        async fn handle(&self, _event: Event, _ctx: &HookContext) -> HookResult {
            HookResult::error("failed", "boom")
        }
    }

    #[tokio::test]
    async fn test_handlers_fire_in_registration_order() {
        let audit = Arc::new(AuditSink::new(256));
        let mut pipeline = HookPipeline::new(audit, true);

        let h1 = Arc::new(CountingHandler {
            name: "first".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let h2 = Arc::new(CountingHandler {
            name: "second".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        });
        pipeline.register(h1.clone());
        pipeline.register(h2.clone());

        let ctx = HookContext::new("t1", "discord:1@abc");
        pipeline.fire(Event::BeforeTurn, &ctx).await;

        assert_eq!(h1.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h2.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_status_does_not_abort_remaining_handlers() {
        let audit = Arc::new(AuditSink::new(256));
        let mut pipeline = HookPipeline::new(audit, true);
        let calls = Arc::new(AtomicUsize::new(0));
        pipeline.register(Arc::new(ErroringHandler));
        pipeline.register(Arc::new(CountingHandler {
            name: "after".to_string(),
            calls: calls.clone(),
        }));

        let ctx = HookContext::new("t1", "discord:1@abc");
        pipeline.fire(Event::OnError, &ctx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_pipeline_skips_handlers_but_still_audits() {
        let audit = Arc::new(AuditSink::new(256));
        let pipeline = HookPipeline::new(audit.clone(), false);
        let ctx = HookContext::new("t1", "discord:1@abc");
        pipeline.fire(Event::BeforeTurn, &ctx).await;

        assert_eq!(audit.pending_count().await, 1);
    }
}
