//! Agent loop — the LLM ↔ tool-calling main loop.
//!
//! Port of nanobot's `agent/loop.py`.
//! Receives inbound messages, builds context, calls the LLM, dispatches
//! tool calls, and publishes outbound responses.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info};

use picoclaw_core::bus::queue::MessageBus;
use picoclaw_core::bus::types::{InboundMessage, OutboundMessage};
use picoclaw_core::hooks::{AuditSink, Event, HookContext, HookPipeline, PolicyHandler};
use picoclaw_core::session::manager::SessionManager;
use picoclaw_core::types::{Message, ToolCall};
use picoclaw_providers::traits::{LlmProvider, LlmRequestConfig};

use crate::context::ContextBuilder;
use crate::subagent::SubagentManager;
use crate::tools::message::MessageTool;
use crate::tools::registry::ToolRegistry;
use crate::tools::filesystem::{EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
use crate::tools::shell::ExecTool;
use crate::tools::spawn::SpawnTool;
use crate::tools::web::{WebFetchTool, WebSearchTool};

/// Default maximum LLM ↔ tool iterations per user message.
const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Default bounded capacity of the per-workspace audit-entry queue (§4.5).
const DEFAULT_AUDIT_QUEUE_SIZE: usize = 256;

/// Configuration for the exec tool.
#[derive(Clone, Debug)]
pub struct ExecToolConfig {
    /// Timeout in seconds (default 60).
    pub timeout: u64,
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self { timeout: 60 }
    }
}

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

/// The main agent loop: polls the message bus, calls the LLM, dispatches tools.
pub struct AgentLoop {
    /// Message bus for inbound/outbound messages.
    bus: Arc<MessageBus>,
    /// LLM provider.
    provider: Arc<dyn LlmProvider>,
    /// Workspace root.
    workspace: PathBuf,
    /// Model to use (overrides provider default if set).
    model: String,
    /// Max LLM ↔ tool iterations per message.
    max_iterations: usize,
    /// LLM request config (temperature, max_tokens).
    request_config: LlmRequestConfig,
    /// Tool registry.
    tools: ToolRegistry,
    /// Context builder.
    context: ContextBuilder,
    /// Session manager.
    sessions: SessionManager,
    /// Reference to the message tool (for set_context).
    message_tool: Arc<MessageTool>,
    /// Spawn tool reference (for set_context).
    spawn_tool: Arc<SpawnTool>,
    /// Subagent manager (also held by SpawnTool; kept for direct access).
    #[allow(dead_code)]
    subagent_manager: Arc<SubagentManager>,
    /// Turn-lifecycle hook pipeline (§4.5), rooted at this agent's workspace.
    hooks: Arc<HookPipeline>,
    /// Audit sink backing `hooks`; kept so `shutdown_hooks` can drain it.
    audit: Arc<AuditSink>,
    /// Writer task handle for `audit`, taken by `shutdown_hooks`.
    audit_handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    /// Monotonic counter used to mint turn ids unique within this process.
    turn_counter: AtomicU64,
}

impl AgentLoop {
    /// Create a new agent loop.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: Arc<MessageBus>,
        provider: Arc<dyn LlmProvider>,
        workspace: PathBuf,
        model: Option<String>,
        max_iterations: Option<usize>,
        request_config: Option<LlmRequestConfig>,
        brave_api_key: Option<String>,
        exec_config: Option<ExecToolConfig>,
        restrict_to_workspace: bool,
        session_manager: Option<SessionManager>,
        agent_name: Option<String>,
    ) -> Self {
        let model = model.unwrap_or_else(|| provider.default_model().to_string());
        let max_iterations = max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        let request_config = request_config.unwrap_or_default();
        let exec_config = exec_config.unwrap_or_default();
        let agent_name = agent_name.unwrap_or_else(|| "Picoclaw".into());
        let sessions =
            session_manager.unwrap_or_else(|| SessionManager::new(None).expect("failed to create session manager"));

        let context = ContextBuilder::new(&workspace, &agent_name);

        // Build tool registry
        let mut tools = ToolRegistry::new();
        let allowed_dir = if restrict_to_workspace {
            Some(workspace.clone())
        } else {
            None
        };

        tools.register(Arc::new(ReadFileTool::new(allowed_dir.clone())));
        tools.register(Arc::new(WriteFileTool::new(allowed_dir.clone())));
        tools.register(Arc::new(EditFileTool::new(allowed_dir.clone())));
        tools.register(Arc::new(ListDirTool::new(allowed_dir)));
        tools.register(Arc::new(ExecTool::new(
            workspace.clone(),
            Some(exec_config.timeout),
            restrict_to_workspace,
        )));
        tools.register(Arc::new(WebSearchTool::new(brave_api_key.clone())));
        tools.register(Arc::new(WebFetchTool::new()));

        let message_tool = Arc::new(MessageTool::new(None));
        tools.register(message_tool.clone());

        // Subagent manager + spawn tool
        let subagent_manager = Arc::new(SubagentManager::new(
            provider.clone(),
            workspace.clone(),
            bus.clone(),
            model.clone(),
            brave_api_key,
            exec_config,
            restrict_to_workspace,
            request_config.clone(),
        ));

        let spawn_tool = Arc::new(SpawnTool::new(subagent_manager.clone()));
        tools.register(spawn_tool.clone());

        info!(
            model = %model,
            tools = tools.len(),
            max_iterations = max_iterations,
            "agent loop initialized"
        );

        // Hook pipeline: one policy handler loaded from this workspace's
        // `hooks.yaml`/`HOOKS.md`, writing to `<workspace>/hooks/hook-events.jsonl`.
        let audit = Arc::new(AuditSink::new(DEFAULT_AUDIT_QUEUE_SIZE));
        let audit_path = workspace.join("hooks").join("hook-events.jsonl");
        let audit_handle = audit.start(audit_path);
        let mut hooks = HookPipeline::new(audit.clone(), true);
        hooks.register(Arc::new(PolicyHandler::load(&workspace)));
        let hooks = Arc::new(hooks);

        Self {
            bus,
            provider,
            workspace,
            model,
            max_iterations,
            request_config,
            tools,
            context,
            sessions,
            message_tool,
            spawn_tool,
            subagent_manager,
            hooks,
            audit,
            audit_handle: AsyncMutex::new(Some(audit_handle)),
            turn_counter: AtomicU64::new(0),
        }
    }

    /// Mint a turn id unique within this process: millisecond timestamp +
    /// monotonic counter, avoiding a dependency on a UUID crate the teacher
    /// doesn't already pull in.
    fn next_turn_id(&self) -> String {
        let n = self.turn_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", chrono::Utc::now().timestamp_millis())
    }

    /// Signal the audit-sink writer to drain and stop, and wait for it.
    /// Call this before exiting a short-lived process (CLI single-shot
    /// mode) so the turn's audit entries are flushed to disk; long-running
    /// processes (the gateway) can skip it and let the writer run for the
    /// process lifetime.
    pub async fn shutdown_hooks(&self) {
        self.audit.signal_shutdown();
        let handle = self.audit_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Run the event loop: poll inbound messages and process them.
    ///
    /// This runs indefinitely until the inbound channel is closed.
    pub async fn run(&self) {
        info!("agent loop started, waiting for messages");
        loop {
            match self.bus.consume_inbound().await {
                Some(msg) => {
                    let session_key = msg.session_key();
                    debug!(session_key = %session_key, "received message");

                    // Route system messages (from subagents) vs regular messages
                    let result = if msg.channel == "system" && msg.sender_id == "subagent" {
                        self.process_system_message(&msg).await
                    } else {
                        self.process_message(&msg).await
                    };

                    match result {
                        Ok(response) => {
                            if let Err(e) = self.bus.publish_outbound(response).await {
                                error!(error = %e, "failed to publish outbound message");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, session_key = %session_key, "message processing error");
                            let err_msg = OutboundMessage::new(
                                &msg.channel,
                                &msg.chat_id,
                                &format!("I encountered an error: {e}"),
                            );
                            let _ = self.bus.publish_outbound(err_msg).await;
                        }
                    }
                }
                None => {
                    info!("inbound channel closed, agent loop exiting");
                    break;
                }
            }
        }
    }

    /// Process a single inbound message → outbound response.
    ///
    /// This is the core agent logic:
    /// 1. Get/create session, load history
    /// 2. Build context messages
    /// 3. LLM ↔ tool loop
    /// 4. Save session, return response
    pub async fn process_message(&self, msg: &InboundMessage) -> Result<OutboundMessage> {
        let session_key = msg.session_key();

        // Set message tool context for this conversation
        self.message_tool
            .set_context(&msg.channel, &msg.chat_id)
            .await;

        // Set spawn tool context for this conversation
        self.spawn_tool
            .set_context(&msg.channel, &msg.chat_id)
            .await;

        // Get session history
        let history = self.sessions.get_history(&session_key, 50);

        // Build LLM messages
        let media_paths: Vec<String> = msg.media.iter().map(|m| m.path.clone()).collect();
        let messages = self.context.build_messages(
            &history,
            &msg.content,
            &media_paths,
            &msg.channel,
            &msg.chat_id,
        );

        let mut ctx = HookContext::new(self.next_turn_id(), session_key.clone());
        ctx.channel = msg.channel.clone();
        ctx.chat_id = msg.chat_id.clone();
        ctx.model = self.model.clone();
        ctx.user_message = msg.content.clone();

        let content = self.run_turn(&mut ctx, messages).await?;

        // Save conversation to session
        self.sessions
            .add_message(&session_key, Message::user(&msg.content));
        self.sessions
            .add_message(&session_key, Message::assistant(&content));

        Ok(OutboundMessage::new(&msg.channel, &msg.chat_id, &content))
    }

    /// Run the LLM ↔ tool-calling loop for one turn, firing the seven
    /// hook-pipeline events around it (§4.5): `before_turn` once at the
    /// start, `before_llm`/`after_llm` around each provider call,
    /// `before_tool`/`after_tool` around each tool execution, and
    /// `after_turn` on success or `on_error` in its place on failure.
    async fn run_turn(&self, ctx: &mut HookContext, mut messages: Vec<Message>) -> Result<String> {
        self.hooks.fire(Event::BeforeTurn, ctx).await;

        let tool_defs = self.tools.get_definitions();
        let mut final_content: Option<String> = None;

        for iteration in 0..self.max_iterations {
            debug!(iteration = iteration, "LLM call");

            self.hooks.fire(Event::BeforeLlm, ctx).await;
            let response = self
                .provider
                .chat(
                    &messages,
                    Some(&tool_defs),
                    &self.model,
                    &self.request_config,
                )
                .await;
            ctx.llm_response_summary = response.content.clone().or_else(|| {
                (!response.tool_calls.is_empty())
                    .then(|| format!("{} tool call(s) requested", response.tool_calls.len()))
            });
            self.hooks.fire(Event::AfterLlm, ctx).await;

            if response.has_tool_calls() {
                // Add assistant message with tool calls
                let tool_calls: Vec<ToolCall> = response.tool_calls.clone();
                ContextBuilder::add_assistant_message(
                    &mut messages,
                    response.content.clone(),
                    tool_calls.clone(),
                );

                // Execute each tool call
                for tc in &tool_calls {
                    let params: HashMap<String, serde_json::Value> =
                        serde_json::from_str(&tc.function.arguments).unwrap_or_default();

                    info!(
                        tool = %tc.function.name,
                        iteration = iteration,
                        "executing tool call"
                    );

                    ctx.tool_name = Some(tc.function.name.clone());
                    ctx.tool_args = Some(tc.function.arguments.clone());
                    self.hooks.fire(Event::BeforeTool, ctx).await;

                    let result = self.tools.execute(&tc.function.name, params).await;

                    debug!(
                        tool = %tc.function.name,
                        result_len = result.len(),
                        "tool result"
                    );

                    ctx.tool_result = Some(result.clone());
                    self.hooks.fire(Event::AfterTool, ctx).await;
                    ctx.tool_name = None;
                    ctx.tool_args = None;
                    ctx.tool_result = None;

                    ContextBuilder::add_tool_result(&mut messages, &tc.id, &result);
                }
            } else {
                // No tool calls → final answer
                final_content = response.content;
                break;
            }
        }

        // If we exhausted iterations without a final answer
        let content = final_content
            .unwrap_or_else(|| "I've completed processing but have no response to give.".into());

        ctx.llm_response_summary = Some(content.clone());
        self.hooks.fire(Event::AfterTurn, ctx).await;

        Ok(content)
    }

    /// Process a system message (from a subagent or cron).
    ///
    /// Parses the original `channel:chat_id` from `msg.chat_id`,
    /// loads the original session, runs a full LLM call to summarize
    /// the result, and routes the response back to the correct channel.
    pub async fn process_system_message(&self, msg: &InboundMessage) -> Result<OutboundMessage> {
        info!(
            sender = %msg.sender_id,
            chat_id = %msg.chat_id,
            "processing system message"
        );

        // Parse origin from chat_id format "channel:chat_id"
        let (origin_channel, origin_chat_id) = match msg.chat_id.split_once(':') {
            Some((ch, cid)) => (ch.to_string(), cid.to_string()),
            None => {
                return Err(anyhow::anyhow!(
                    "Invalid system message chat_id format: {}",
                    msg.chat_id
                ));
            }
        };

        // Prefer the resolver-stamped key (routing-aware, hash-suffixed)
        // so this turn lands in the same session as the chat's own
        // messages; only bare "channel:chat_id" messages (no routing,
        // e.g. tests) fall back to the unstamped form.
        let session_key = msg
            .session_key
            .clone()
            .unwrap_or_else(|| format!("{origin_channel}:{origin_chat_id}"));

        // Set tools context to the original channel/chat
        self.message_tool
            .set_context(&origin_channel, &origin_chat_id)
            .await;
        self.spawn_tool
            .set_context(&origin_channel, &origin_chat_id)
            .await;

        // Load the original session
        let history = self.sessions.get_history(&session_key, 50);

        // Build messages with the subagent result as the "user" message
        let messages =
            self.context
                .build_messages(&history, &msg.content, &[], &origin_channel, &origin_chat_id);

        let mut ctx = HookContext::new(self.next_turn_id(), session_key.clone());
        ctx.channel = origin_channel.clone();
        ctx.chat_id = origin_chat_id.clone();
        ctx.model = self.model.clone();
        ctx.user_message = msg.content.clone();

        let content = self.run_turn(&mut ctx, messages).await?;

        // Save to the original session
        self.sessions
            .add_message(&session_key, Message::user(&msg.content));
        self.sessions
            .add_message(&session_key, Message::assistant(&content));

        // Route response to the original channel/chat
        Ok(OutboundMessage::new(
            &origin_channel,
            &origin_chat_id,
            &content,
        ))
    }

    /// Direct processing mode (CLI entry point).
    ///
    /// Wraps text into an `InboundMessage` on the "cli" channel and processes.
    pub async fn process_direct(&self, text: &str) -> Result<String> {
        let msg = InboundMessage::new("cli", "user", "direct", text);
        let response = self.process_message(&msg).await?;
        Ok(response.content)
    }

    /// Get a reference to the tool registry (for testing/extension).
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use picoclaw_core::types::{LlmResponse, ToolDefinition};

    /// A mock LLM provider that returns canned responses.
    struct MockProvider {
        /// Responses to return in sequence.
        responses: std::sync::Mutex<Vec<LlmResponse>>,
    }

    impl MockProvider {
        fn new(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses),
            }
        }

        fn simple(text: &str) -> Self {
            Self::new(vec![LlmResponse {
                content: Some(text.into()),
                ..Default::default()
            }])
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
            _model: &str,
            _config: &LlmRequestConfig,
        ) -> LlmResponse {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                LlmResponse {
                    content: Some("(no more responses)".into()),
                    ..Default::default()
                }
            } else {
                responses.remove(0)
            }
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn display_name(&self) -> &str {
            "MockProvider"
        }
    }

    fn create_test_loop(provider: Arc<dyn LlmProvider>) -> AgentLoop {
        let bus = Arc::new(MessageBus::new(32));
        let workspace = std::env::temp_dir().join("picoclaw_test_agent");
        let _ = std::fs::create_dir_all(&workspace);

        AgentLoop::new(
            bus,
            provider,
            workspace,
            None,
            Some(5),
            None,
            None,
            None,
            false,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_agent_simple_response() {
        let provider = Arc::new(MockProvider::simple("Hello from Picoclaw!"));
        let agent = create_test_loop(provider);

        let result = agent.process_direct("Hi").await.unwrap();
        assert_eq!(result, "Hello from Picoclaw!");
    }

    #[tokio::test]
    async fn test_agent_tool_calling() {
        // First response: LLM requests read_file tool call
        // Second response: LLM gives final answer
        let dir = tempfile::tempdir().unwrap();
        let test_file = dir.path().join("test.txt");
        std::fs::write(&test_file, "file content here").unwrap();

        let tool_call = ToolCall::new(
            "call_1",
            "read_file",
            serde_json::json!({"path": test_file.to_str().unwrap()}).to_string(),
        );

        let responses = vec![
            LlmResponse {
                content: None,
                tool_calls: vec![tool_call],
                ..Default::default()
            },
            LlmResponse {
                content: Some("The file contains: file content here".into()),
                ..Default::default()
            },
        ];

        let provider = Arc::new(MockProvider::new(responses));
        let bus = Arc::new(MessageBus::new(32));

        let agent = AgentLoop::new(
            bus,
            provider,
            dir.path().to_path_buf(),
            None,
            Some(10),
            None,
            None,
            None,
            false,
            None,
            None,
        );

        let result = agent.process_direct("Read test.txt").await.unwrap();
        assert_eq!(result, "The file contains: file content here");
    }

    #[tokio::test]
    async fn test_agent_max_iterations() {
        // All responses are tool calls → should exhaust max_iterations
        let tool_call = ToolCall::new("call_loop", "list_dir", r#"{"path": "/tmp"}"#);
        let responses: Vec<LlmResponse> = (0..10)
            .map(|_| LlmResponse {
                content: None,
                tool_calls: vec![tool_call.clone()],
                ..Default::default()
            })
            .collect();

        let provider = Arc::new(MockProvider::new(responses));
        let agent = create_test_loop(provider);

        let result = agent.process_direct("loop forever").await.unwrap();
        assert!(result.contains("completed processing"));
    }

    #[tokio::test]
    async fn test_default_tools_registered() {
        let provider = Arc::new(MockProvider::simple("ok"));
        let agent = create_test_loop(provider);

        let names = agent.tools().tool_names();
        assert!(names.contains(&"read_file".into()));
        assert!(names.contains(&"write_file".into()));
        assert!(names.contains(&"edit_file".into()));
        assert!(names.contains(&"list_dir".into()));
        assert!(names.contains(&"exec".into()));
        assert!(names.contains(&"web_search".into()));
        assert!(names.contains(&"web_fetch".into()));
        assert!(names.contains(&"message".into()));
        assert!(names.contains(&"spawn".into()));
        assert_eq!(names.len(), 9);
        agent.shutdown_hooks().await;
    }

    #[tokio::test]
    async fn test_model_defaults_to_provider() {
        let provider = Arc::new(MockProvider::simple("ok"));
        let agent = create_test_loop(provider);
        assert_eq!(agent.model(), "mock-model");
        agent.shutdown_hooks().await;
    }

    #[test]
    fn test_exec_tool_config_default() {
        let config = ExecToolConfig::default();
        assert_eq!(config.timeout, 60);
    }

    #[tokio::test]
    async fn test_process_system_message() {
        let provider = Arc::new(MockProvider::simple("Here's a summary of the result."));
        let bus = Arc::new(MessageBus::new(32));
        let workspace = std::env::temp_dir().join("picoclaw_test_system_msg");
        let _ = std::fs::create_dir_all(&workspace);

        let agent = AgentLoop::new(
            bus,
            provider,
            workspace,
            None,
            Some(5),
            None,
            None,
            None,
            false,
            None,
            None,
        );

        // Simulate a subagent result message
        let msg = InboundMessage::new(
            "system",
            "subagent",
            "telegram:chat_42",
            "## Subagent Result\n**Task**: test\n\nDone!",
        );

        let response = agent.process_system_message(&msg).await.unwrap();

        // Response should be routed to the original channel/chat
        assert_eq!(response.channel, "telegram");
        assert_eq!(response.chat_id, "chat_42");
        assert_eq!(response.content, "Here's a summary of the result.");
    }

    #[tokio::test]
    async fn test_process_system_message_invalid_format() {
        let provider = Arc::new(MockProvider::simple("ok"));
        let agent = create_test_loop(provider);

        // Missing colon separator
        let msg = InboundMessage::new("system", "subagent", "invalid_chat_id", "test");

        let result = agent.process_system_message(&msg).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_routes_system_messages() {
        // Verify that the run loop correctly routes system messages
        let provider = Arc::new(MockProvider::simple("Summary of result"));
        let bus = Arc::new(MessageBus::new(32));
        let workspace = std::env::temp_dir().join("picoclaw_test_run_route");
        let _ = std::fs::create_dir_all(&workspace);

        let agent = AgentLoop::new(
            bus.clone(),
            provider,
            workspace,
            None,
            Some(5),
            None,
            None,
            None,
            false,
            None,
            None,
        );

        // Publish a system message
        let msg = InboundMessage::new(
            "system",
            "subagent",
            "discord:guild_1",
            "Subagent result content",
        );
        bus.publish_inbound(msg).await.unwrap();

        // Drop the inbound sender by dropping our handle — but we need
        // a different approach since MessageBus owns the sender.
        // Instead, just test process_message routing directly.

        // We already test process_system_message above, so just verify
        // the agent has the spawn tool
        assert!(agent.tools().has("spawn"));
    }

    #[tokio::test]
    async fn test_subagent_manager_accessible() {
        let provider = Arc::new(MockProvider::simple("ok"));
        let agent = create_test_loop(provider);

        // Subagent manager should start with 0 tasks
        assert_eq!(agent.subagent_manager.task_count().await, 0);
    }
}
