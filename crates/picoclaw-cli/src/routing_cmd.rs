//! `picoclaw routing` — manage channel-to-workspace routing from the CLI.
//!
//! Implements the routing CLI contract from spec §6: `status`, `list`,
//! `add`, `remove`, `set-users`, `validate`, `reload`, `explain`. Output is
//! line-oriented `key: value` blocks and `- channel chat_id` list headers
//! with indented detail lines, matching `channels_cmd.rs`'s style — these
//! are stable strings the operator UI parses, not free-form prose.

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;

use picoclaw_core::bus::types::InboundMessage;
use picoclaw_core::config::{load_config, save_config, Config};
use picoclaw_core::routing::{RoutingMapping, RoutingResolver, UnmappedBehavior};

/// Routing subcommands.
#[derive(Subcommand)]
pub enum RoutingCommands {
    /// Show whether routing is enabled and the unmapped-chat policy
    Status,

    /// List every configured mapping
    List,

    /// Add (or replace) a mapping
    Add {
        #[arg(long)]
        channel: String,
        #[arg(long = "chat-id")]
        chat_id: String,
        #[arg(long)]
        workspace: String,
        /// Repeatable: `--allow 123 --allow @alice`
        #[arg(long)]
        allow: Vec<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long = "mention-required", default_value_t = false)]
        mention_required: bool,
    },

    /// Remove the mapping for a `(channel, chat-id)` pair
    Remove {
        #[arg(long)]
        channel: String,
        #[arg(long = "chat-id")]
        chat_id: String,
    },

    /// Replace the allowlist for an existing mapping
    SetUsers {
        #[arg(long)]
        channel: String,
        #[arg(long = "chat-id")]
        chat_id: String,
        /// Repeatable: `--allow 123 --allow @alice`
        #[arg(long)]
        allow: Vec<String>,
    },

    /// Validate the routing table without saving
    Validate,

    /// Re-read the routing table from disk (the running gateway's resolver
    /// picks up the change on its own next reload tick)
    Reload,

    /// Show what decision the resolver would make for a given message
    Explain {
        #[arg(long)]
        channel: String,
        #[arg(long = "chat-id")]
        chat_id: String,
        #[arg(long)]
        sender: String,
    },
}

/// Dispatch a routing subcommand.
pub fn dispatch(cmd: RoutingCommands) -> Result<()> {
    match cmd {
        RoutingCommands::Status => status(),
        RoutingCommands::List => list(),
        RoutingCommands::Add {
            channel,
            chat_id,
            workspace,
            allow,
            label,
            mention_required,
        } => add(channel, chat_id, workspace, allow, label, mention_required),
        RoutingCommands::Remove { channel, chat_id } => remove(channel, chat_id),
        RoutingCommands::SetUsers {
            channel,
            chat_id,
            allow,
        } => set_users(channel, chat_id, allow),
        RoutingCommands::Validate => validate(),
        RoutingCommands::Reload => reload(),
        RoutingCommands::Explain {
            channel,
            chat_id,
            sender,
        } => explain(channel, chat_id, sender),
    }
}

// ─────────────────────────────────────────────
// routing status
// ─────────────────────────────────────────────

fn status() -> Result<()> {
    let config = load_config(None);
    let routing = &config.routing;

    println!("enabled: {}", routing.enabled);
    println!(
        "unmapped_behavior: {}",
        unmapped_behavior_str(routing.unmapped_behavior)
    );
    println!("mappings: {}", routing.mappings.len());
    println!(
        "default_workspace: {}",
        config.agents.defaults.workspace
    );
    Ok(())
}

// ─────────────────────────────────────────────
// routing list
// ─────────────────────────────────────────────

fn list() -> Result<()> {
    let config = load_config(None);

    if config.routing.mappings.is_empty() {
        println!("{}", "(no routing mappings configured)".dimmed());
        return Ok(());
    }

    for mapping in &config.routing.mappings {
        println!("- {} {}", mapping.channel, mapping.chat_id);
        println!("    workspace: {}", mapping.workspace);
        println!("    allowed_senders: {}", mapping.allowed_senders.join(", "));
        println!(
            "    label: {}",
            mapping.label.as_deref().unwrap_or("")
        );
        println!("    mention_required: {}", mapping.mention_required);
    }
    Ok(())
}

// ─────────────────────────────────────────────
// routing add
// ─────────────────────────────────────────────

fn add(
    channel: String,
    chat_id: String,
    workspace: String,
    allow: Vec<String>,
    label: Option<String>,
    mention_required: bool,
) -> Result<()> {
    if allow.is_empty() {
        bail!("--allow must be given at least once");
    }

    let workspace = crate::helpers::expand_tilde(&workspace)
        .to_string_lossy()
        .to_string();

    let mut config = load_config(None);
    let channel_lc = channel.to_lowercase();

    config
        .routing
        .mappings
        .retain(|m| !(m.channel.to_lowercase() == channel_lc && m.chat_id == chat_id));

    config.routing.mappings.push(RoutingMapping {
        channel: channel.clone(),
        chat_id: chat_id.clone(),
        workspace: workspace.clone(),
        allowed_senders: allow,
        label,
        mention_required,
    });

    save_config(&config, None)?;
    println!(
        "{} mapping added: {} {} -> {}",
        "✓".green(),
        channel,
        chat_id,
        workspace
    );
    Ok(())
}

// ─────────────────────────────────────────────
// routing remove
// ─────────────────────────────────────────────

fn remove(channel: String, chat_id: String) -> Result<()> {
    let mut config = load_config(None);
    let channel_lc = channel.to_lowercase();

    let before = config.routing.mappings.len();
    config
        .routing
        .mappings
        .retain(|m| !(m.channel.to_lowercase() == channel_lc && m.chat_id == chat_id));

    if config.routing.mappings.len() == before {
        bail!("no mapping found for channel={channel} chat_id={chat_id}");
    }

    save_config(&config, None)?;
    println!("{} mapping removed: {} {}", "✓".green(), channel, chat_id);
    Ok(())
}

// ─────────────────────────────────────────────
// routing set-users
// ─────────────────────────────────────────────

fn set_users(channel: String, chat_id: String, allow: Vec<String>) -> Result<()> {
    if allow.is_empty() {
        bail!("--allow must be given at least once");
    }

    let mut config = load_config(None);
    let channel_lc = channel.to_lowercase();

    let mapping = config
        .routing
        .mappings
        .iter_mut()
        .find(|m| m.channel.to_lowercase() == channel_lc && m.chat_id == chat_id);

    match mapping {
        Some(m) => {
            m.allowed_senders = allow;
        }
        None => bail!("no mapping found for channel={channel} chat_id={chat_id}"),
    }

    save_config(&config, None)?;
    println!(
        "{} allowlist updated: {} {}",
        "✓".green(),
        channel,
        chat_id
    );
    Ok(())
}

// ─────────────────────────────────────────────
// routing validate
// ─────────────────────────────────────────────

fn validate() -> Result<()> {
    let config = load_config(None);
    match config.routing.validate() {
        Ok(()) => {
            println!(
                "{} routing table is valid ({} mappings)",
                "✓".green(),
                config.routing.mappings.len()
            );
            Ok(())
        }
        Err(e) => {
            println!("{} routing table is invalid: {}", "✗".red(), e);
            bail!(e);
        }
    }
}

// ─────────────────────────────────────────────
// routing reload
// ─────────────────────────────────────────────

fn reload() -> Result<()> {
    // The CLI has no handle to a running gateway process; this re-reads and
    // re-validates the on-disk table so the operator gets the same pass/fail
    // signal a live `RoutingResolver::reload` would produce before it ever
    // reaches a running gateway (which re-reads on its own tick, §4.3).
    let config = load_config(None);
    config.routing.validate()?;
    println!("{} routing configuration reloaded", "✓".green());
    Ok(())
}

// ─────────────────────────────────────────────
// routing explain
// ─────────────────────────────────────────────

fn explain(channel: String, chat_id: String, sender: String) -> Result<()> {
    let config = load_config(None);
    let resolver = build_resolver(&config);

    let msg = InboundMessage::new(channel, sender, chat_id, "");
    let decision = resolver.resolve(&msg);

    println!("event: {:?}", decision.event);
    println!("allowed: {}", decision.allowed);
    println!("channel: {}", decision.channel);
    println!("chat_id: {}", decision.chat_id);
    println!("sender_id: {}", decision.sender_id);
    println!(
        "workspace: {}",
        decision.workspace.as_deref().unwrap_or("")
    );
    println!(
        "session_key: {}",
        decision.session_key.as_deref().unwrap_or("")
    );
    println!("reason: {}", decision.reason);
    println!(
        "mapping_label: {}",
        decision.mapping_label.as_deref().unwrap_or("")
    );
    Ok(())
}

fn build_resolver(config: &Config) -> RoutingResolver {
    let default_workspace = crate::helpers::expand_tilde(&config.agents.defaults.workspace)
        .to_string_lossy()
        .to_string();
    RoutingResolver::new(config.routing.clone(), default_workspace)
}

fn unmapped_behavior_str(b: UnmappedBehavior) -> &'static str {
    match b {
        UnmappedBehavior::Block => "block",
        UnmappedBehavior::Default => "default",
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use picoclaw_core::routing::RoutingConfig;

    #[test]
    fn test_unmapped_behavior_str() {
        assert_eq!(unmapped_behavior_str(UnmappedBehavior::Block), "block");
        assert_eq!(unmapped_behavior_str(UnmappedBehavior::Default), "default");
    }

    #[test]
    fn test_build_resolver_uses_default_workspace() {
        let mut config = Config::default();
        config.agents.defaults.workspace = "/tmp/picoclaw-default".to_string();
        config.routing = RoutingConfig::default();
        let resolver = build_resolver(&config);
        let msg = InboundMessage::new("discord", "u1", "42", "hi");
        let decision = resolver.resolve(&msg);
        // routing disabled by default -> route_match against default workspace
        assert!(decision.allowed);
        assert_eq!(decision.workspace.as_deref(), Some("/tmp/picoclaw-default"));
    }
}
