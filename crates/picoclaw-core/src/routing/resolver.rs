//! Routing resolver — a pure function over an immutable snapshot of the
//! routing table, swappable atomically so `routing reload` never restarts
//! workers.
//!
//! No teacher precedent (the teacher routes everything to one workspace);
//! built fresh in the teacher's idiom — a plain struct, no hidden global
//! state, mirroring `MessageBus`'s style — with the snapshot held behind
//! `RwLock<Arc<_>>` the way `discord.rs` already guards `typing_tasks`.

use std::sync::{Arc, RwLock};

use sha2::{Digest, Sha256};

use crate::bus::types::InboundMessage;
use crate::identity;

use super::types::{Decision, DecisionEvent, RoutingConfig, RoutingMapping, UnmappedBehavior};

/// The channel name used for internally synthesized turns (e.g. subagent
/// results routed back through the dispatcher).
pub const INTERNAL_CHANNEL: &str = "system";

/// An immutable point-in-time view of the routing table, cheap to clone via
/// `Arc` and safe to read from multiple worker threads concurrently.
#[derive(Clone, Debug)]
pub struct RoutingSnapshot {
    config: RoutingConfig,
    default_workspace: String,
}

impl RoutingSnapshot {
    pub fn new(config: RoutingConfig, default_workspace: impl Into<String>) -> Self {
        Self {
            config,
            default_workspace: default_workspace.into(),
        }
    }

    fn find_mapping(&self, channel: &str, chat_id: &str) -> Option<&RoutingMapping> {
        let channel_lc = channel.to_lowercase();
        self.config
            .mappings
            .iter()
            .find(|m| m.channel.to_lowercase() == channel_lc && m.chat_id == chat_id)
    }
}

/// Derives `"<channel>:<chat_id>@<first 12 hex of SHA-256(canonical(workspace))>"`.
///
/// The workspace hash makes the key distinct when the same chat is
/// remapped to a different workspace, so cached agent/session state never
/// leaks across workspaces.
pub fn session_key(channel: &str, chat_id: &str, workspace: &str) -> String {
    let canonical = std::fs::canonicalize(workspace)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| workspace.to_string());
    let digest = Sha256::digest(canonical.as_bytes());
    let hex = hex_encode(&digest);
    format!("{channel}:{chat_id}@{}", &hex[..12])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Resolves inbound messages to a workspace (or a denial) per §4.3's
/// seven-step algorithm. Holds a swappable [`RoutingSnapshot`] so
/// `reload()` installs a new table without restarting any worker.
pub struct RoutingResolver {
    snapshot: RwLock<Arc<RoutingSnapshot>>,
}

impl RoutingResolver {
    pub fn new(config: RoutingConfig, default_workspace: impl Into<String>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RoutingSnapshot::new(config, default_workspace))),
        }
    }

    /// Install a new routing table, taking effect for every subsequent
    /// `resolve()` call. In-flight turns are unaffected.
    pub fn reload(&self, config: RoutingConfig, default_workspace: impl Into<String>) {
        let next = Arc::new(RoutingSnapshot::new(config, default_workspace));
        let mut guard = self.snapshot.write().expect("routing snapshot lock poisoned");
        *guard = next;
    }

    fn current(&self) -> Arc<RoutingSnapshot> {
        self.snapshot
            .read()
            .expect("routing snapshot lock poisoned")
            .clone()
    }

    /// Pure resolution per §4.3. Never touches directory *contents* — only
    /// `Path::is_dir()`, which is a single stat call, so a cloud-backed
    /// workspace mount cannot stall the dispatcher's hot path.
    pub fn resolve(&self, msg: &InboundMessage) -> Decision {
        let snap = self.current();

        // Step 1: internal channel bypass. Sender-allowlist and mention
        // gating (steps 4/5) never apply to internal messages, but the
        // origin chat's own mapping (step 3) still determines which
        // workspace owns it — an internal message for a chat mapped to
        // workspace A must not be silently processed in the default
        // workspace.
        if msg.channel == INTERNAL_CHANNEL {
            if let Some((origin_channel, origin_chat_id)) = msg.chat_id.split_once(':') {
                let workspace = snap
                    .find_mapping(origin_channel, origin_chat_id)
                    .map(|m| m.workspace.clone())
                    .unwrap_or_else(|| snap.default_workspace.clone());
                return Decision {
                    event: DecisionEvent::RouteMatch,
                    allowed: true,
                    channel: origin_channel.to_string(),
                    chat_id: origin_chat_id.to_string(),
                    sender_id: msg.sender_id.clone(),
                    session_key: Some(session_key(origin_channel, origin_chat_id, &workspace)),
                    workspace: Some(workspace),
                    reason: "internal channel, parsed origin".to_string(),
                    mapping_label: None,
                };
            }
            let workspace = snap.default_workspace.clone();
            return Decision {
                event: DecisionEvent::RouteMatch,
                allowed: true,
                channel: msg.channel.clone(),
                chat_id: msg.chat_id.clone(),
                sender_id: msg.sender_id.clone(),
                session_key: Some(session_key(&msg.channel, &msg.chat_id, &workspace)),
                workspace: Some(workspace),
                reason: "internal channel, unparseable chat_id, default workspace".to_string(),
                mapping_label: None,
            };
        }

        // Step 2: routing disabled globally.
        if !snap.config.enabled {
            let workspace = snap.default_workspace.clone();
            return Decision {
                event: DecisionEvent::RouteMatch,
                allowed: true,
                channel: msg.channel.clone(),
                chat_id: msg.chat_id.clone(),
                sender_id: msg.sender_id.clone(),
                session_key: Some(session_key(&msg.channel, &msg.chat_id, &workspace)),
                workspace: Some(workspace),
                reason: "routing disabled".to_string(),
                mapping_label: None,
            };
        }

        // Step 3: mapping lookup.
        let mapping = match snap.find_mapping(&msg.channel, &msg.chat_id) {
            Some(m) => m.clone(),
            None => {
                return match snap.config.unmapped_behavior {
                    UnmappedBehavior::Default => {
                        let workspace = snap.default_workspace.clone();
                        Decision {
                            event: DecisionEvent::RouteUnmapped,
                            allowed: true,
                            channel: msg.channel.clone(),
                            chat_id: msg.chat_id.clone(),
                            sender_id: msg.sender_id.clone(),
                            session_key: Some(session_key(&msg.channel, &msg.chat_id, &workspace)),
                            workspace: Some(workspace),
                            reason: "unmapped chat, default workspace".to_string(),
                            mapping_label: None,
                        }
                    }
                    UnmappedBehavior::Block => Decision {
                        event: DecisionEvent::RouteUnmapped,
                        allowed: false,
                        channel: msg.channel.clone(),
                        chat_id: msg.chat_id.clone(),
                        sender_id: msg.sender_id.clone(),
                        workspace: None,
                        session_key: None,
                        reason: "unmapped chat, block mode".to_string(),
                        mapping_label: None,
                    },
                };
            }
        };

        // Step 4: allowlist.
        if !identity::is_allowed(&msg.sender_id, &mapping.allowed_senders) {
            return Decision {
                event: DecisionEvent::RouteDeny,
                allowed: false,
                channel: msg.channel.clone(),
                chat_id: msg.chat_id.clone(),
                sender_id: msg.sender_id.clone(),
                workspace: None,
                session_key: None,
                reason: "sender not in allowlist".to_string(),
                mapping_label: mapping.label.clone(),
            };
        }

        // Step 5: mention gating.
        if mapping.mention_required {
            let is_dm = msg
                .metadata
                .get("is_dm")
                .map(|v| v == "true")
                .unwrap_or(false);
            let is_mention = msg
                .metadata
                .get("is_mention")
                .map(|v| v == "true")
                .unwrap_or(false);
            if !is_dm && !is_mention {
                return Decision {
                    event: DecisionEvent::RouteMentionSkip,
                    allowed: false,
                    channel: msg.channel.clone(),
                    chat_id: msg.chat_id.clone(),
                    sender_id: msg.sender_id.clone(),
                    workspace: None,
                    session_key: None,
                    reason: "mention required, none present".to_string(),
                    mapping_label: mapping.label.clone(),
                };
            }
        }

        // Step 6: workspace validity. Stat only — never read directory contents.
        let workspace_path = std::path::Path::new(&mapping.workspace);
        if !workspace_path.is_dir() {
            return Decision {
                event: DecisionEvent::RouteInvalid,
                allowed: false,
                channel: msg.channel.clone(),
                chat_id: msg.chat_id.clone(),
                sender_id: msg.sender_id.clone(),
                workspace: None,
                session_key: None,
                reason: format!("workspace is not a directory: {}", mapping.workspace),
                mapping_label: mapping.label.clone(),
            };
        }

        // Step 7: match.
        Decision {
            event: DecisionEvent::RouteMatch,
            allowed: true,
            channel: msg.channel.clone(),
            chat_id: msg.chat_id.clone(),
            sender_id: msg.sender_id.clone(),
            session_key: Some(session_key(&msg.channel, &msg.chat_id, &mapping.workspace)),
            workspace: Some(mapping.workspace.clone()),
            reason: "matched mapping".to_string(),
            mapping_label: mapping.label.clone(),
        }
    }
}
