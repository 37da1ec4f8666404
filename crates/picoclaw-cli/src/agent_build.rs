//! Shared `AgentLoop` construction from `Config` — the same provider /
//! Brave key / session-manager resolution logic is needed by the
//! single-shot CLI, the gateway's heartbeat agent, and the per-workspace
//! turn-handler factory; this is the one place it's written.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use picoclaw_agent::{AgentLoop, ExecToolConfig};
use picoclaw_core::bus::queue::MessageBus;
use picoclaw_core::config::Config;
use picoclaw_core::session::SessionManager;
use picoclaw_providers::http_provider::create_provider;

/// Build an `AgentLoop` rooted at `workspace`, using `config` for the
/// model/provider/tool settings. `workspace` overrides
/// `config.agents.defaults.workspace` (callers resolve and create the
/// directory themselves, since the default vs. per-mapping workspace
/// resolution differs by caller).
pub fn build_agent_loop(config: &Config, workspace: &Path, bus: Arc<MessageBus>) -> Result<AgentLoop> {
    let defaults = &config.agents.defaults;
    let model = &defaults.model;

    let providers_map = config.providers.to_map();
    let provider = create_provider(model, &providers_map).map_err(|e| anyhow::anyhow!(e))?;

    let brave_key = if config.tools.web.search.api_key.is_empty() {
        None
    } else {
        Some(config.tools.web.search.api_key.clone())
    };

    let session_manager = SessionManager::new(None).context("failed to create session manager")?;

    Ok(AgentLoop::new(
        bus,
        Arc::new(provider),
        workspace.to_path_buf(),
        Some(model.to_string()),
        Some(defaults.max_tool_iterations as usize),
        None,
        brave_key,
        Some(ExecToolConfig::default()),
        config.tools.restrict_to_workspace,
        Some(session_manager),
        None,
    ))
}
