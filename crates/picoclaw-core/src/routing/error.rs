//! Errors produced while validating or reloading the routing table.

/// Errors surfaced by [`crate::routing::types::RoutingConfig::validate`] and
/// by [`crate::routing::resolver::RoutingResolver::reload`].
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("routing.unmapped_behavior must be \"block\" or \"default\", got {0:?}")]
    InvalidUnmappedBehavior(String),

    #[error("routing mapping #{index} is missing a required field: {field}")]
    MissingField { index: usize, field: &'static str },

    #[error(
        "duplicate routing mapping for channel={channel:?} chat_id={chat_id:?} (mapping #{index})"
    )]
    DuplicateMapping {
        index: usize,
        channel: String,
        chat_id: String,
    },

    #[error("routing mapping #{index} workspace is not an absolute path: {workspace}")]
    WorkspaceNotAbsolute { index: usize, workspace: String },

    #[error("routing mapping #{index} workspace is not a readable directory: {workspace}")]
    WorkspaceUnreadable { index: usize, workspace: String },

    #[error("routing mapping #{index} has an empty allowed_senders list")]
    EmptyAllowedSenders { index: usize },
}
