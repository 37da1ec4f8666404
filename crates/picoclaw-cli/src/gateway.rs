//! Gateway command — orchestrates channels, routing, the agent-loop pool,
//! and message dispatch.
//!
//! Port of nanobot's gateway command from `cli/commands.py`, generalized
//! with the routing resolver and per-workspace agent pool (§4.3/§4.4):
//! inbound messages no longer go straight to one agent loop — they pass
//! through a `Dispatcher` that resolves which workspace (if any) owns
//! the chat and hands it to that workspace's pooled worker.
//!
//! Startup sequence:
//! 1. Load config
//! 2. Create message bus
//! 3. Create the routing resolver and the agent-loop pool (one
//!    `AgentLoop` built lazily per workspace)
//! 4. Create channel manager, register enabled channels
//! 5. Run: `tokio::select!` of dispatcher + channel manager + heartbeat
//! 6. Handle Ctrl+C for graceful shutdown

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use picoclaw_channels::ChannelManager;
use picoclaw_core::bus::queue::MessageBus;
use picoclaw_core::config::load_config;
use picoclaw_core::heartbeat::HeartbeatService;
use picoclaw_core::pool::dispatcher::Dispatcher;
use picoclaw_core::pool::workspace_pool::AgentLoopPool;
use picoclaw_core::routing::resolver::RoutingResolver;

use crate::agent_turn_handler::AgentLoopTurnHandlerFactory;
use crate::helpers;

/// Run the gateway — starts the dispatcher (routing + agent pool) +
/// channel manager + heartbeat.
pub async fn run() -> Result<()> {
    println!();
    helpers::print_banner();
    println!("  Mode: Gateway");
    println!();

    // 1. Load config
    let config = load_config(None);
    let defaults = &config.agents.defaults;

    // 2. Resolve default workspace (used for unrouted/internal traffic
    //    and as the base workspace the heartbeat callback runs against)
    let workspace = helpers::expand_tilde(&defaults.workspace);
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("failed to create workspace: {}", workspace.display()))?;

    // 3. Create message bus (shared between dispatcher + channels)
    let bus = Arc::new(MessageBus::new(100));

    let model = &defaults.model;

    // 4. Routing resolver — reads config.routing, falls back to the
    //    default workspace for routing-disabled/unmapped-default modes.
    let resolver = Arc::new(RoutingResolver::new(
        config.routing.clone(),
        workspace.display().to_string(),
    ));

    // 5. Agent-loop pool — builds one AgentLoop per canonicalized
    //    workspace path, lazily, on first dispatched message.
    let factory = Arc::new(AgentLoopTurnHandlerFactory::new(config.clone(), bus.clone()));
    let pool = Arc::new(AgentLoopPool::new(factory));

    let dispatcher = Dispatcher::new(bus.clone(), resolver, pool.clone());

    // 6. Heartbeat agent: a single long-lived AgentLoop over the default
    //    workspace, used only for the periodic heartbeat prompt — not on
    //    the routed message path.
    let heartbeat_agent = Arc::new(crate::agent_build::build_agent_loop(
        &config,
        &workspace,
        bus.clone(),
    )?);

    // 7. Create heartbeat service
    let heartbeat = {
        let agent = heartbeat_agent.clone();
        let callback: picoclaw_core::heartbeat::OnHeartbeatFn = Arc::new(move |prompt| {
            let agent = agent.clone();
            Box::pin(async move { agent.process_direct(&prompt).await })
        });
        Arc::new(HeartbeatService::new(
            workspace.clone(),
            Some(callback),
            None, // default 30 min
            true,
        ))
    };

    // 8. Create channel manager
    // Register configured channels
    #[allow(unused_mut)]
    let mut channel_manager = ChannelManager::new(bus.clone());

    // Telegram
    #[cfg(feature = "telegram")]
    {
        let tg = &config.channels.telegram;
        if !tg.token.is_empty() {
            use picoclaw_channels::telegram::TelegramChannel;
            let mut telegram = TelegramChannel::new(
                tg.token.clone(),
                bus.clone(),
                tg.allowed_users.clone(),
            );

            // Wire voice transcription if configured
            if config.transcription.enabled {
                let tc = &config.transcription;
                // Resolve API key: config > groq provider key > env var
                let transcription_key = if !tc.api_key.is_empty() {
                    tc.api_key.clone()
                } else if !config.providers.groq.api_key.is_empty() {
                    config.providers.groq.api_key.clone()
                } else {
                    String::new()
                };

                if !transcription_key.is_empty() {
                    use picoclaw_providers::GroqTranscriber;
                    use picoclaw_providers::TranscriptionProvider;
                    let transcriber = Arc::new(GroqTranscriber::new(&transcription_key));
                    if transcriber.is_configured() {
                        let t = transcriber.clone();
                        telegram = telegram.with_transcriber(Arc::new(move |path: String| {
                            let t = t.clone();
                            Box::pin(async move {
                                t.transcribe(std::path::Path::new(&path)).await
                            })
                        }));
                        info!("voice transcription enabled (Groq Whisper)");
                    }
                }
            }

            channel_manager.register(Arc::new(telegram));
            info!("registered telegram channel");
        }
    }

    // Discord
    #[cfg(feature = "discord")]
    {
        let dc = &config.channels.discord;
        if !dc.token.is_empty() {
            use picoclaw_channels::discord::DiscordChannel;
            let discord = DiscordChannel::new(
                dc.token.clone(),
                bus.clone(),
                dc.allowed_users.clone(),
            );
            channel_manager.register(Arc::new(discord));
            info!("registered discord channel");
        }
    }

    // WhatsApp
    #[cfg(feature = "whatsapp")]
    {
        let wa = &config.channels.whatsapp;
        if !wa.bridge_url.is_empty() {
            use picoclaw_channels::whatsapp::WhatsAppChannel;
            let whatsapp = WhatsAppChannel::new(
                wa.bridge_url.clone(),
                bus.clone(),
                wa.allowed_users.clone(),
            );
            channel_manager.register(Arc::new(whatsapp));
            info!("registered whatsapp channel");
        }
    }

    // Slack
    #[cfg(feature = "slack")]
    {
        let sl = &config.channels.slack;
        if !sl.bot_token.is_empty() && !sl.app_token.is_empty() {
            use picoclaw_channels::slack::SlackChannel;
            let slack = SlackChannel::new(sl.clone(), bus.clone());
            channel_manager.register(Arc::new(slack));
            info!("registered slack channel");
        }
    }

    // Email
    #[cfg(feature = "email")]
    {
        let em = &config.channels.email;
        if !em.imap_host.is_empty() {
            use picoclaw_channels::email::EmailChannel;
            let email = EmailChannel::new(em.clone(), bus.clone());
            channel_manager.register(Arc::new(email));
            info!("registered email channel");
        }
    }
    info!(
        model = %model,
        workspace = %workspace.display(),
        channels = ?channel_manager.channel_names(),
        "gateway starting"
    );

    println!(
        "  Model:     {}",
        model
    );
    println!(
        "  Workspace: {}",
        workspace.display()
    );
    println!(
        "  Channels:  {} registered",
        channel_manager.len()
    );
    println!(
        "  Routing:   {} ({} mappings)",
        if config.routing.enabled { "enabled" } else { "disabled" },
        config.routing.mappings.len()
    );
    println!("  Heartbeat: every 30m");
    println!();

    if channel_manager.is_empty() {
        println!("  ⚠  No channels registered. The dispatcher will run but");
        println!("     only process messages from the internal bus.");
        println!("     Configure channels in ~/.picoclaw/config.json");
        println!();
    }

    println!("  Ctrl+C to stop");
    println!();

    // 9. Run: dispatcher + channel manager + heartbeat concurrently
    //    Ctrl+C triggers graceful shutdown
    tokio::select! {
        _ = dispatcher.run() => {
            info!("dispatcher exited");
        }
        result = channel_manager.start_all() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "channel manager error");
            }
        }
        result = heartbeat.start() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "heartbeat service error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("  Shutting down...");
            info!("received Ctrl+C, shutting down");
            heartbeat.stop();
            channel_manager.stop_all().await;
            pool.close().await;
            heartbeat_agent.shutdown_hooks().await;
        }
    }

    println!("  Gateway stopped. Goodbye!");
    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    // Gateway integration tests would require a full runtime environment.
    // The component tests are in picoclaw-channels and picoclaw-agent crates.
    // Here we just verify the module compiles and the imports work.

    #[test]
    fn test_module_compiles() {
        // If this test runs, the gateway module compiles correctly
        assert!(true);
    }
}
