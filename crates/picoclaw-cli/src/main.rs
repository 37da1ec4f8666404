//! Picoclaw CLI — entry point.
//!
//! Replaces nanobot's `cli/commands.py` (Typer app).
//!
//! # Commands
//!
//! - `picoclaw agent [-m MESSAGE] [-s SESSION]` — main chat (single-shot or REPL)
//! - `picoclaw onboard` — initialize config + workspace
//! - `picoclaw status` — show configuration and provider status

mod agent_build;
mod agent_turn_handler;
mod helpers;
mod onboard;
mod repl;
mod status;
mod gateway;
mod channels_cmd;
mod routing_cmd;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use picoclaw_agent::AgentLoop;
use picoclaw_core::bus::queue::MessageBus;
use picoclaw_core::config::{load_config, Config};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// 🦀 Picoclaw — Ultra-lightweight AI assistant in Rust
#[derive(Parser)]
#[command(name = "picoclaw", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the AI agent (single-shot or interactive REPL)
    Agent {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Session identifier (format: "channel:id")
        #[arg(short, long, default_value = "cli:default")]
        session: String,

        /// Disable Markdown rendering in output
        #[arg(long, default_value_t = false)]
        no_markdown: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Initialize configuration and workspace
    Onboard,

    /// Show configuration and provider status
    Status,

    /// Start the gateway (all channels + agent loop)
    Gateway {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Manage chat channels
    Channels {
        #[command(subcommand)]
        action: channels_cmd::ChannelsCommands,
    },

    /// Manage channel-to-workspace routing
    Routing {
        #[command(subcommand)]
        action: routing_cmd::RoutingCommands,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Agent {
            message,
            session,
            no_markdown,
            logs,
        } => {
            init_logging(logs);
            run_agent(message, session, !no_markdown, logs).await
        }
        Commands::Onboard => onboard::run(),
        Commands::Status => status::run(),
        Commands::Gateway { logs } => {
            init_logging(logs);
            gateway::run().await
        }
        Commands::Channels { action } => channels_cmd::dispatch(action),
        Commands::Routing { action } => {
            init_logging(false);
            routing_cmd::dispatch(action)
        }
    }
}

// ─────────────────────────────────────────────
// Agent command
// ─────────────────────────────────────────────

async fn run_agent(
    message: Option<String>,
    session_id: String,
    render_markdown: bool,
    show_logs: bool,
) -> Result<()> {
    let config = load_config(None);
    let agent_loop = build_agent_loop(&config)?;

    match message {
        Some(msg) => {
            // Single-shot mode
            info!(session = %session_id, "processing single message");
            let response = agent_loop
                .process_direct(&msg)
                .await
                .context("agent processing failed")?;
            helpers::print_response(&response, render_markdown);
            agent_loop.shutdown_hooks().await;
        }
        None => {
            // Interactive REPL mode
            repl::run(agent_loop, &session_id, render_markdown, show_logs).await?;
        }
    }

    Ok(())
}

/// Build an `AgentLoop` from the loaded configuration.
pub fn build_agent_loop(config: &Config) -> Result<AgentLoop> {
    let workspace = helpers::expand_tilde(&config.agents.defaults.workspace);
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("failed to create workspace: {}", workspace.display()))?;

    let bus = Arc::new(MessageBus::new(100));
    agent_build::build_agent_loop(config, &workspace, bus)
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("picoclaw=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
