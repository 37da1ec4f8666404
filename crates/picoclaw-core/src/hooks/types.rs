//! Hook pipeline data model — the seven fixed lifecycle events and the
//! context/result/audit types that flow through them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The turn-lifecycle events fired by the hook pipeline, in fixed order
/// within a turn. `before_tool`/`after_tool` fire once per tool call; the
/// rest fire once per turn. `on_error` fires instead of `after_turn` when
/// the turn aborts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    BeforeTurn,
    BeforeLlm,
    AfterLlm,
    BeforeTool,
    AfterTool,
    AfterTurn,
    OnError,
}

impl Event {
    pub const ALL: [Event; 7] = [
        Event::BeforeTurn,
        Event::BeforeLlm,
        Event::AfterLlm,
        Event::BeforeTool,
        Event::AfterTool,
        Event::AfterTurn,
        Event::OnError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Event::BeforeTurn => "before_turn",
            Event::BeforeLlm => "before_llm",
            Event::AfterLlm => "after_llm",
            Event::BeforeTool => "before_tool",
            Event::AfterTool => "after_tool",
            Event::AfterTurn => "after_turn",
            Event::OnError => "on_error",
        }
    }
}

/// Immutable snapshot passed to every handler for one event firing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HookContext {
    pub turn_id: String,
    pub session_key: String,
    pub channel: String,
    pub chat_id: String,
    pub model: String,
    pub user_message: String,
    pub tool_name: Option<String>,
    pub tool_args: Option<String>,
    pub tool_result: Option<String>,
    pub llm_response_summary: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl HookContext {
    pub fn new(turn_id: impl Into<String>, session_key: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            session_key: session_key.into(),
            ..Default::default()
        }
    }
}

/// Status a hook handler returns. The pipeline never aborts a turn on an
/// error status — only `before_*` events are even eligible per §4.5, and
/// the built-in policy handler never marks one fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStatus {
    Ok,
    Error,
}

/// What a handler returns for one event firing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HookResult {
    pub status: HookStatus,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl HookResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: HookStatus::Ok,
            message: message.into(),
            metadata: HashMap::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn error(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: HookStatus::Error,
            message: message.into(),
            metadata: HashMap::new(),
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// HookContext + HookResult flattened with the triggering event and
/// handler name, written one-per-line as JSONL to the audit sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: Event,
    pub handler: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub context: HookContext,
    pub status: HookStatus,
    pub message: String,
    #[serde(default)]
    pub result_metadata: HashMap<String, String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl AuditEntry {
    pub fn new(event: Event, handler: impl Into<String>, ctx: &HookContext, result: &HookResult) -> Self {
        Self {
            event,
            handler: handler.into(),
            timestamp: chrono::Utc::now(),
            context: ctx.clone(),
            status: result.status,
            message: result.message.clone(),
            result_metadata: result.metadata.clone(),
            error: result.error.clone(),
            duration_ms: result.duration_ms,
        }
    }
}
