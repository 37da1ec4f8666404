//! Inbound dispatcher — consumes the bus's inbound topic, resolves
//! routing, and either sends a sanctioned user-visible notice or stamps
//! the session key and hands the message to the workspace pool.
//!
//! Grounded in `picoclaw-channels::manager::ChannelManager::dispatch_outbound`:
//! same `tokio::spawn` + `tokio::select!` shutdown idiom, generalized from
//! "one task reading outbound, routing by channel name" to "one task
//! reading inbound, routing by resolver decision, keyed fan-out to the
//! workspace pool."

use std::sync::Arc;

use tracing::{info, warn};

use crate::bus::queue::MessageBus;
use crate::bus::types::{InboundMessage, OutboundMessage};
use crate::routing::{Decision, DecisionEvent, RoutingResolver, INTERNAL_CHANNEL};

use super::workspace_pool::AgentLoopPool;

/// The CLI binary name used in the unmapped-chat operator hint.
const BINARY_NAME: &str = "picoclaw";

/// Runs the single dispatcher task: `bus.consume_inbound()` → resolve →
/// notice-or-dispatch, until the bus closes.
pub struct Dispatcher {
    bus: Arc<MessageBus>,
    resolver: Arc<RoutingResolver>,
    pool: Arc<AgentLoopPool>,
}

impl Dispatcher {
    pub fn new(bus: Arc<MessageBus>, resolver: Arc<RoutingResolver>, pool: Arc<AgentLoopPool>) -> Self {
        Self {
            bus,
            resolver,
            pool,
        }
    }

    /// Run until the bus is closed. Intended to be raced via
    /// `tokio::select!` alongside the channel manager and agent workers,
    /// matching the teacher's top-level gateway wiring.
    pub async fn run(&self) {
        loop {
            let Some(msg) = self.bus.consume_inbound().await else {
                info!("dispatcher stopping, bus closed");
                break;
            };
            self.handle(msg).await;
        }
    }

    async fn handle(&self, mut msg: InboundMessage) {
        let decision = self.resolver.resolve(&msg);

        info!(
            event = decision.event.as_str(),
            allowed = decision.allowed,
            channel = %decision.channel,
            chat_id = %decision.chat_id,
            sender_id = %decision.sender_id,
            reason = %decision.reason,
            "routing decision"
        );

        if decision.allowed {
            msg.session_key = decision.session_key.clone();
            let Some(workspace) = decision.workspace.clone() else {
                warn!("allowed decision missing workspace, dropping message");
                return;
            };

            if let Err(e) = self.pool.dispatch(&workspace, msg).await {
                warn!(error = %e, "pool dispatch failed");
                if let Some(notice) = generic_failure_notice(&decision) {
                    self.publish_notice(&decision, notice).await;
                }
            }
            return;
        }

        if let Some(notice) = notice_for(&decision) {
            self.publish_notice(&decision, notice).await;
        }
    }

    async fn publish_notice(&self, decision: &Decision, content: String) {
        let outbound = OutboundMessage::new(decision.channel.clone(), decision.chat_id.clone(), content);
        if let Err(e) = self.bus.publish_outbound(outbound).await {
            warn!(error = %e, "failed to publish routing notice");
        }
    }
}

/// Never echoes internal state beyond these sanctioned strings (§4.4/§7).
/// Suppressed entirely for the internal channel and for quiet
/// `route_mention_skip` decisions.
fn notice_for(decision: &Decision) -> Option<String> {
    if decision.channel == INTERNAL_CHANNEL {
        return None;
    }

    match decision.event {
        DecisionEvent::RouteUnmapped => Some(format!(
            "This chat is not mapped\u{2026}\n\nOperator setup hint:\n  {BINARY_NAME} routing add --channel {} --chat-id {} --workspace /absolute/path --allow {}",
            decision.channel, decision.chat_id, decision.sender_id
        )),
        DecisionEvent::RouteDeny => Some("not authorized".to_string()),
        DecisionEvent::RouteInvalid => Some(format!(
            "This workspace mapping is invalid. Ask your operator to run `{BINARY_NAME} routing validate`."
        )),
        DecisionEvent::RouteMentionSkip => None,
        DecisionEvent::RouteMatch => None,
    }
}

fn generic_failure_notice(decision: &Decision) -> Option<String> {
    if decision.channel == INTERNAL_CHANNEL {
        return None;
    }
    Some("routing failed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::workspace_pool::{TurnHandler, TurnHandlerFactory};
    use crate::routing::{RoutingConfig, UnmappedBehavior};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct NoopHandler;
    #[async_trait]
    impl TurnHandler for NoopHandler {
        async fn handle_inbound(&self, _msg: InboundMessage) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NoopFactory {
        built: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl TurnHandlerFactory for NoopFactory {
        async fn build(&self, _workspace: &Path) -> anyhow::Result<Arc<dyn TurnHandler>> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NoopHandler))
        }
    }

    #[tokio::test]
    async fn test_unmapped_block_mode_publishes_operator_hint() {
        let bus = Arc::new(MessageBus::new(10));
        let resolver = Arc::new(RoutingResolver::new(
            RoutingConfig {
                enabled: true,
                unmapped_behavior: UnmappedBehavior::Block,
                mappings: vec![],
            },
            "/ws/default",
        ));
        let built = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(AgentLoopPool::new(Arc::new(NoopFactory { built })));
        let dispatcher = Dispatcher::new(bus.clone(), resolver, pool.clone());

        bus.publish_inbound(InboundMessage::new("discord", "u1", "42", "hi"))
            .await
            .unwrap();
        let msg = bus.consume_inbound().await.unwrap();
        dispatcher.handle(msg).await;

        let notice = bus.consume_outbound().await.unwrap();
        assert!(notice.content.contains("routing add --channel discord --chat-id 42"));
        pool.close().await;
    }

    #[tokio::test]
    async fn test_mention_skip_produces_no_notice() {
        let bus = Arc::new(MessageBus::new(10));
        let dir = tempdir().unwrap();
        let ws = dir.path().to_str().unwrap().to_string();
        let resolver = Arc::new(RoutingResolver::new(
            RoutingConfig {
                enabled: true,
                unmapped_behavior: UnmappedBehavior::Block,
                mappings: vec![crate::routing::RoutingMapping {
                    channel: "discord".to_string(),
                    chat_id: "42".to_string(),
                    workspace: ws,
                    allowed_senders: vec!["u1".to_string()],
                    label: None,
                    mention_required: true,
                }],
            },
            "/ws/default",
        ));
        let built = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(AgentLoopPool::new(Arc::new(NoopFactory { built })));
        let dispatcher = Dispatcher::new(bus.clone(), resolver, pool.clone());

        dispatcher
            .handle(InboundMessage::new("discord", "u1", "42", "hi"))
            .await;

        // Close the bus and assert nothing was queued.
        bus.close();
        assert!(bus.consume_outbound().await.is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_matched_decision_dispatches_to_pool() {
        let bus = Arc::new(MessageBus::new(10));
        let dir = tempdir().unwrap();
        let ws = dir.path().to_str().unwrap().to_string();
        let resolver = Arc::new(RoutingResolver::new(RoutingConfig::default(), &ws));
        let built = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(AgentLoopPool::new(Arc::new(NoopFactory {
            built: built.clone(),
        })));
        let dispatcher = Dispatcher::new(bus.clone(), resolver, pool.clone());

        dispatcher
            .handle(InboundMessage::new("discord", "u1", "42", "hi"))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(built.load(Ordering::SeqCst), 1);
        pool.close().await;
    }
}
