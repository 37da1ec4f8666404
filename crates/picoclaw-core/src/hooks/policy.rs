//! Built-in policy handler — loads `hooks.yaml` (+ `HOOKS.md` narrative)
//! from a workspace and annotates every event firing with the configured
//! verbosity/capture/instruction set.
//!
//! Grounded in `crate::config::schema`'s typed-config style, using
//! `serde_yaml` for the on-disk format (added per "enrich from the rest of
//! the pack" — other example repos in the retrieval pack already depend on
//! `serde_yaml` for exactly this kind of workspace-local policy file).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::pipeline::HookHandler;
use super::types::{Event, HookContext, HookResult};

/// One event's policy: whether it runs, how verbose its audit entry is,
/// which HookContext fields it should capture, and free-form instructions
/// (surfaced to the LLM or operator, never executed).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventPolicy {
    pub enabled: bool,
    pub verbosity: String,
    pub capture_fields: Vec<String>,
    pub instructions: Vec<String>,
}

/// Parsed form of `hooks.yaml`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyModel {
    pub enabled: bool,
    pub events: HashMap<String, EventPolicy>,
}

impl Default for PolicyModel {
    fn default() -> Self {
        let mut events = HashMap::new();
        for event in Event::ALL {
            events.insert(
                event.as_str().to_string(),
                EventPolicy {
                    enabled: true,
                    verbosity: "normal".to_string(),
                    capture_fields: Vec::new(),
                    instructions: Vec::new(),
                },
            );
        }
        Self {
            enabled: true,
            events,
        }
    }
}

/// Non-fatal diagnostics surfaced from `HOOKS.md`. The narrative file is
/// parsed only for warning lines (`!` or `WARNING:` prefixed); it carries
/// no executable policy.
fn parse_hooks_md_warnings(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("WARNING:") {
                Some(rest.trim().to_string())
            } else {
                trimmed.strip_prefix('!').map(|rest| rest.trim().to_string())
            }
        })
        .collect()
}

/// The built-in hook handler backing `hooks.yaml` policy enforcement.
pub struct PolicyHandler {
    model: Result<PolicyModel, String>,
    warnings: Vec<String>,
}

impl PolicyHandler {
    /// Load `<workspace>/hooks.yaml` and `<workspace>/HOOKS.md`. Missing
    /// files are treated as "use defaults", not a load error; a malformed
    /// `hooks.yaml` IS a load error, carried on every subsequent event.
    pub fn load(workspace: &Path) -> Self {
        let yaml_path = workspace.join("hooks.yaml");
        let model = match std::fs::read_to_string(&yaml_path) {
            Ok(contents) => serde_yaml::from_str::<PolicyModel>(&contents)
                .map_err(|e| format!("failed to parse {}: {e}", yaml_path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PolicyModel::default()),
            Err(e) => Err(format!("failed to read {}: {e}", yaml_path.display())),
        };

        let md_path = workspace.join("HOOKS.md");
        let warnings = std::fs::read_to_string(&md_path)
            .map(|c| parse_hooks_md_warnings(&c))
            .unwrap_or_default();

        Self { model, warnings }
    }

    pub fn policy_path(workspace: &Path) -> PathBuf {
        workspace.join("hooks.yaml")
    }
}

#[async_trait]
impl HookHandler for PolicyHandler {
    fn name(&self) -> &str {
        "policy"
    }

    async fn handle(&self, event: Event, _ctx: &HookContext) -> HookResult {
        let model = match &self.model {
            Err(load_error) => {
                return HookResult::error("policy load failed", load_error.clone());
            }
            Ok(model) => model,
        };

        let event_policy = model.events.get(event.as_str()).cloned().unwrap_or_default();

        if !model.enabled || !event_policy.enabled {
            return HookResult::ok("event disabled by policy")
                .with_metadata("policy_enabled", model.enabled.to_string())
                .with_metadata("event_enabled", event_policy.enabled.to_string());
        }

        let mut result = HookResult::ok("policy applied")
            .with_metadata("policy_enabled", model.enabled.to_string())
            .with_metadata("event_enabled", event_policy.enabled.to_string())
            .with_metadata("verbosity", event_policy.verbosity.clone())
            .with_metadata("capture_fields", event_policy.capture_fields.join(","))
            .with_metadata("instructions", event_policy.instructions.join(" | "));

        if !self.warnings.is_empty() {
            result = result.with_metadata("hooks_md_warnings", self.warnings.join(" | "));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_hooks_yaml_uses_defaults() {
        let dir = tempdir().unwrap();
        let handler = PolicyHandler::load(dir.path());
        let ctx = HookContext::new("t1", "discord:1@abc");
        let result = handler.handle(Event::BeforeTurn, &ctx).await;
        assert_eq!(result.message, "policy applied");
        assert_eq!(result.metadata.get("policy_enabled").unwrap(), "true");
    }

    #[tokio::test]
    async fn test_malformed_hooks_yaml_errors_every_event() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("hooks.yaml"), "not: [valid: yaml: :").unwrap();
        let handler = PolicyHandler::load(dir.path());
        let ctx = HookContext::new("t1", "discord:1@abc");
        let result = handler.handle(Event::AfterTurn, &ctx).await;
        assert!(matches!(result.status, super::super::types::HookStatus::Error));
    }

    #[tokio::test]
    async fn test_disabled_event_skips_side_effects() {
        let dir = tempdir().unwrap();
        let yaml = r#"
enabled: true
events:
  before_turn:
    enabled: false
    verbosity: quiet
    capture_fields: []
    instructions: []
"#;
        std::fs::write(dir.path().join("hooks.yaml"), yaml).unwrap();
        let handler = PolicyHandler::load(dir.path());
        let ctx = HookContext::new("t1", "discord:1@abc");
        let result = handler.handle(Event::BeforeTurn, &ctx).await;
        assert_eq!(result.message, "event disabled by policy");
    }

    #[test]
    fn test_hooks_md_warning_parsing() {
        let contents = "Normal line\nWARNING: something is off\n! quick note\n";
        let warnings = parse_hooks_md_warnings(contents);
        assert_eq!(warnings, vec!["something is off", "quick note"]);
    }
}
