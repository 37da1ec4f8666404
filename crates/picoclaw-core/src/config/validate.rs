//! Configuration validation — routing-table invariants enforced at load
//! and save time, on top of the teacher's existing defaulting/migration
//! pipeline in `loader.rs`.

use super::schema::Config;
use crate::routing::RoutingError;

/// Fatal configuration errors (§7 "Configuration errors"). Anything here
/// stops startup (on load) or the write (on save) — never silently
/// corrected, unlike the numeric/string normalization `loader.rs` already
/// does for unrelated fields.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Validate the parts of `Config` that must never be silently "fixed":
/// currently just the routing table (§3 `RoutingMapping` invariants).
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    config.routing.validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{RoutingConfig, RoutingMapping, UnmappedBehavior};

    #[test]
    fn test_default_config_validates() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_routing_rejected() {
        let mut config = Config::default();
        config.routing = RoutingConfig {
            enabled: true,
            unmapped_behavior: UnmappedBehavior::Block,
            mappings: vec![RoutingMapping {
                channel: "discord".to_string(),
                chat_id: "42".to_string(),
                workspace: "relative".to_string(),
                allowed_senders: vec!["u1".to_string()],
                label: None,
                mention_required: false,
            }],
        };
        assert!(validate_config(&config).is_err());
    }
}
