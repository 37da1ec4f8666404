//! Concrete [`TurnHandlerFactory`]/[`TurnHandler`] wiring the workspace
//! pool (`picoclaw-core::pool`) to a real [`AgentLoop`].
//!
//! `picoclaw-core` cannot depend on `picoclaw-agent` (the dependency
//! already runs the other way), so the pool is generic over the
//! `TurnHandler` trait; this is the one concrete implementation, built
//! where both crates are available.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::error;

use picoclaw_agent::AgentLoop;
use picoclaw_core::bus::queue::MessageBus;
use picoclaw_core::bus::types::InboundMessage;
use picoclaw_core::config::Config;
use picoclaw_core::pool::workspace_pool::{TurnHandler, TurnHandlerFactory};

/// Wraps one workspace's [`AgentLoop`], dispatching inbound turns to
/// `process_message` (or `process_system_message` routing via `run()`'s
/// own classification) and publishing the result onto the shared bus.
pub struct AgentLoopTurnHandler {
    agent: AgentLoop,
    bus: Arc<MessageBus>,
}

#[async_trait]
impl TurnHandler for AgentLoopTurnHandler {
    async fn handle_inbound(&self, msg: InboundMessage) -> Result<()> {
        let result = if msg.channel == "system" && msg.sender_id == "subagent" {
            self.agent.process_system_message(&msg).await
        } else {
            self.agent.process_message(&msg).await
        };

        match result {
            Ok(outbound) => {
                if let Err(e) = self.bus.publish_outbound(outbound).await {
                    error!(error = %e, "failed to publish outbound message");
                }
            }
            Err(e) => {
                error!(error = %e, channel = %msg.channel, chat_id = %msg.chat_id, "turn processing failed");
                let notice = picoclaw_core::bus::types::OutboundMessage::new(
                    &msg.channel,
                    &msg.chat_id,
                    &format!("I encountered an error: {e}"),
                );
                if let Err(e) = self.bus.publish_outbound(notice).await {
                    error!(error = %e, "failed to publish error notice");
                }
            }
        }
        Ok(())
    }
}

/// Builds one [`AgentLoopTurnHandler`] per workspace by cloning the
/// global config and overriding `agents.defaults.workspace` (§4.4).
pub struct AgentLoopTurnHandlerFactory {
    config: Config,
    bus: Arc<MessageBus>,
}

impl AgentLoopTurnHandlerFactory {
    pub fn new(config: Config, bus: Arc<MessageBus>) -> Self {
        Self { config, bus }
    }
}

#[async_trait]
impl TurnHandlerFactory for AgentLoopTurnHandlerFactory {
    async fn build(&self, workspace: &Path) -> Result<Arc<dyn TurnHandler>> {
        let mut config = self.config.clone();
        config.agents.defaults.workspace = workspace.display().to_string();

        std::fs::create_dir_all(workspace)
            .with_context(|| format!("failed to create workspace: {}", workspace.display()))?;

        let agent = crate::agent_build::build_agent_loop(&config, workspace, self.bus.clone())?;

        Ok(Arc::new(AgentLoopTurnHandler {
            agent,
            bus: self.bus.clone(),
        }))
    }
}
