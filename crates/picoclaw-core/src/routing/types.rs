//! Routing data model — config schema and resolver output.
//!
//! Unlike the rest of [`crate::config::schema`], this sub-tree is persisted
//! as **snake_case** JSON rather than camelCase: the routing table and the
//! audit trail it feeds are meant to be hand-edited and grepped by
//! operators, and snake_case keys match the `routing add --channel
//! --chat-id` CLI flags verbatim.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::RoutingError;

/// How to treat an inbound message whose `(channel, chat_id)` has no entry
/// in [`RoutingConfig::mappings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedBehavior {
    /// Deny the message and send the operator-hint notice.
    Block,
    /// Route to the default workspace, bypassing the allowlist.
    Default,
}

impl Default for UnmappedBehavior {
    fn default() -> Self {
        UnmappedBehavior::Block
    }
}

/// One `channel` + `chat_id` → workspace binding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RoutingMapping {
    /// Channel identifier (e.g. "discord", "telegram").
    pub channel: String,
    /// Platform-native chat/conversation identifier.
    pub chat_id: String,
    /// Absolute path to the workspace this chat is bound to.
    pub workspace: String,
    /// Identity tokens allowed to use this mapping (see
    /// `crate::routing` identity-equivalence rules, mirrored from
    /// `picoclaw-channels::identity`).
    pub allowed_senders: Vec<String>,
    /// Optional human-readable label shown in `routing list`.
    pub label: Option<String>,
    /// If true, public (non-DM) messages must mention the bot to route.
    pub mention_required: bool,
}

impl Default for RoutingMapping {
    fn default() -> Self {
        Self {
            channel: String::new(),
            chat_id: String::new(),
            workspace: String::new(),
            allowed_senders: Vec::new(),
            label: None,
            mention_required: false,
        }
    }
}

/// The full routing table, persisted at `routing` in `config.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RoutingConfig {
    /// Master switch. When false, every inbound message routes to the
    /// default workspace regardless of `mappings`.
    pub enabled: bool,
    /// What to do with chats that have no mapping entry.
    pub unmapped_behavior: UnmappedBehavior,
    /// The mapping table, checked in order but keyed uniquely by
    /// `(lowercase channel, chat_id)`.
    pub mappings: Vec<RoutingMapping>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            unmapped_behavior: UnmappedBehavior::Block,
            mappings: Vec::new(),
        }
    }
}

impl RoutingConfig {
    /// Validate every [`RoutingMapping`] invariant from the data model:
    /// non-empty `channel`/`chat_id`, absolute+readable `workspace`,
    /// non-empty `allowed_senders`, and no two mappings sharing
    /// `(lowercase channel, chat_id)`.
    ///
    /// Does not validate `unmapped_behavior` — that is a fixed enum and
    /// can't deserialize to an invalid value, so the string-based check
    /// described in spec §7 only applies to a raw (untyped) config load;
    /// callers parsing from `serde_json::Value` should check that case
    /// before deserializing into this struct.
    pub fn validate(&self) -> Result<(), RoutingError> {
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for (index, mapping) in self.mappings.iter().enumerate() {
            if mapping.channel.is_empty() {
                return Err(RoutingError::MissingField {
                    index,
                    field: "channel",
                });
            }
            if mapping.chat_id.is_empty() {
                return Err(RoutingError::MissingField {
                    index,
                    field: "chat_id",
                });
            }
            if mapping.workspace.is_empty() {
                return Err(RoutingError::MissingField {
                    index,
                    field: "workspace",
                });
            }
            if mapping.allowed_senders.is_empty() {
                return Err(RoutingError::EmptyAllowedSenders { index });
            }

            let workspace_path = Path::new(&mapping.workspace);
            if !workspace_path.is_absolute() {
                return Err(RoutingError::WorkspaceNotAbsolute {
                    index,
                    workspace: mapping.workspace.clone(),
                });
            }
            if !workspace_path.is_dir() {
                return Err(RoutingError::WorkspaceUnreadable {
                    index,
                    workspace: mapping.workspace.clone(),
                });
            }

            let key = (mapping.channel.to_lowercase(), mapping.chat_id.clone());
            if !seen.insert(key.clone()) {
                return Err(RoutingError::DuplicateMapping {
                    index,
                    channel: key.0,
                    chat_id: key.1,
                });
            }
        }

        Ok(())
    }
}

/// Why the resolver made the decision it made, carried as the event name in
/// structured logs and audit entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionEvent {
    /// A mapping matched and every gate (allowlist, mention) passed.
    RouteMatch,
    /// No mapping matched `(channel, chat_id)`.
    RouteUnmapped,
    /// A mapping matched but the sender failed the allowlist.
    RouteDeny,
    /// A mapping matched but its workspace is missing or not a directory.
    RouteInvalid,
    /// A mapping required a mention/DM and this message had neither —
    /// a quiet skip, not a user-visible denial.
    RouteMentionSkip,
}

/// The resolver's verdict for one [`crate::bus::types::InboundMessage`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Decision {
    pub event: DecisionEvent,
    pub allowed: bool,
    pub channel: String,
    pub chat_id: String,
    pub sender_id: String,
    /// Absolute workspace path, present whenever `allowed` is true.
    pub workspace: Option<String>,
    /// `"<channel>:<chat_id>@<hash>"`, present whenever `allowed` is true.
    pub session_key: Option<String>,
    pub reason: String,
    /// The matched mapping's `label`, if any.
    pub mapping_label: Option<String>,
}

impl Decision {
    pub fn is_internal_bypass(event: DecisionEvent) -> bool {
        matches!(event, DecisionEvent::RouteMatch)
    }
}
