//! Agent orchestration loop.
//!
//! One turn:
//! 1. Load the enabled tools (fresh every turn)
//! 2. Build a system prompt that states the tool status
//! 3. No tools: a single model call, its answer is final
//! 4. Tools: call the model with the tool array; run every requested call
//!    in order, append the results, and call again until the model answers
//!    or the iteration cap is hit
//!
//! A failing tool call never aborts the turn: its error text becomes the
//! `tool` message content. Config, model and iteration-cap failures are
//! fatal.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pagewise::agent::Orchestrator;
//! use pagewise::llm::{ChatCompletionsClient, LlmSettings};
//! use pagewise::mcp::{FileToolConfig, McpHttpClient, ToolRegistry};
//!
//! let model = Arc::new(ChatCompletionsClient::new(LlmSettings::local("qwen3:8b")));
//! let registry = ToolRegistry::new(
//!     Arc::new(FileToolConfig::new("mcp.json")),
//!     McpHttpClient::default(),
//! );
//! let orchestrator = Orchestrator::new(model, registry);
//! let outcome = orchestrator.run("what's the weather in Paris?", None).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::prompt::{DEFAULT_BASE_PROMPT, system_prompt};
use super::session::{TurnOutcome, TurnSession};
use super::steps::ReasoningStep;
use super::transport::{AgentEventStream, DEFAULT_HEARTBEAT, EventSink, spawn_turn};
use crate::error::{AgentError, ModelError};
use crate::llm::{ApiMessage, ChatModel, RoundOutcome, ToolCallRequest, ToolDefinition};
use crate::mcp::{LoadedTools, ToolRegistry};
use crate::normalized::AgentEvent;

pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// How model output reaches the caller.
#[derive(Clone, Copy)]
enum Mode<'a> {
    Blocking,
    Streaming(&'a EventSink),
}

impl Mode<'_> {
    fn is_streaming(&self) -> bool {
        matches!(self, Mode::Streaming(_))
    }
}

/// Drives turns against a [`ChatModel`] and the tools of a [`ToolRegistry`].
///
/// Holds no per-turn state; every turn gets its own [`TurnSession`].
#[derive(Clone)]
pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    registry: ToolRegistry,
    base_prompt: String,
    max_iterations: usize,
    heartbeat: Duration,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("max_iterations", &self.max_iterations)
            .field("heartbeat", &self.heartbeat)
            .finish()
    }
}

impl Orchestrator {
    /// Create a new orchestrator with the default prompt, iteration cap and
    /// heartbeat.
    pub fn new(model: Arc<dyn ChatModel>, registry: ToolRegistry) -> Self {
        Self {
            model,
            registry,
            base_prompt: DEFAULT_BASE_PROMPT.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }

    #[must_use]
    pub fn with_base_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base_prompt = prompt.into();
        self
    }

    /// Cap on model calls per turn when tools are offered.
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Keepalive period for streamed turns.
    #[must_use]
    pub fn with_heartbeat(mut self, period: Duration) -> Self {
        self.heartbeat = period;
        self
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    /// Run one turn to completion. `context` is appended to the base prompt.
    pub async fn run(
        &self,
        user_text: &str,
        context: Option<&str>,
    ) -> Result<TurnOutcome, AgentError> {
        self.drive(Mode::Blocking, user_text, context).await
    }

    /// Run one turn, sending chunks and step batches through `sink`.
    /// Terminal events are left to the caller.
    pub async fn run_with_sink(
        &self,
        user_text: &str,
        context: Option<&str>,
        sink: &EventSink,
    ) -> Result<TurnOutcome, AgentError> {
        self.drive(Mode::Streaming(sink), user_text, context).await
    }

    /// Run one turn on a spawned task and stream its events.
    pub fn run_streaming(
        &self,
        user_text: impl Into<String>,
        context: Option<String>,
        cancel: CancellationToken,
    ) -> AgentEventStream {
        let orchestrator = self.clone();
        let user_text = user_text.into();
        spawn_turn(self.heartbeat, cancel, move |sink| async move {
            orchestrator
                .run_with_sink(&user_text, context.as_deref(), &sink)
                .await
                .map(TurnOutcome::into_message)
        })
    }

    async fn drive(
        &self,
        mode: Mode<'_>,
        user_text: &str,
        context: Option<&str>,
    ) -> Result<TurnOutcome, AgentError> {
        let tools = self.registry.load_enabled_tools().await?;

        let base = match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => format!("{}\n\n{c}", self.base_prompt),
            None => self.base_prompt.clone(),
        };
        let mut session = TurnSession::new(system_prompt(&base, &tools), user_text);
        if let Mode::Streaming(sink) = mode {
            session = session.with_request_id(sink.request_id());
        }
        let request_id = session.request_id().to_string();

        tracing::info!(
            request_id = %request_id,
            tool_count = tools.tools.len(),
            tools_configured = tools.configured,
            streaming = mode.is_streaming(),
            "Starting turn"
        );

        if tools.is_empty() {
            return match self.call_model(mode, session.transcript(), &[]).await? {
                RoundOutcome::Text { text, thinking } => Ok(session.finish(text, thinking)),
                RoundOutcome::ToolCalls { .. } => Err(ModelError::Protocol(
                    "tool calls requested but no tools were offered".to_string(),
                )
                .into()),
            };
        }

        for iteration in 1..=self.max_iterations {
            tracing::info!(
                request_id = %request_id,
                iteration = iteration,
                message_count = session.transcript().len(),
                "Starting tool loop iteration"
            );

            match self
                .call_model(mode, session.transcript(), &tools.tools)
                .await?
            {
                RoundOutcome::Text { text, thinking } => {
                    tracing::info!(
                        request_id = %request_id,
                        iteration = iteration,
                        answer_length = text.len(),
                        "Final answer received"
                    );
                    return Ok(session.finish(text, thinking));
                }
                RoundOutcome::ToolCalls { calls, thinking } => {
                    let mark = session.steps().len();
                    session.record_thinking(thinking.as_deref());
                    self.execute_round(&mut session, &tools, calls, iteration)
                        .await;

                    if let Mode::Streaming(sink) = mode {
                        sink.send(AgentEvent::ReasoningStep {
                            steps: session.steps().since(mark).to_vec(),
                        });
                    }
                }
            }
        }

        tracing::error!(
            request_id = %request_id,
            max_iterations = self.max_iterations,
            "Maximum tool loop iterations exceeded"
        );
        Err(AgentError::IterationCapExceeded {
            max: self.max_iterations,
        })
    }

    async fn call_model(
        &self,
        mode: Mode<'_>,
        transcript: &[ApiMessage],
        tools: &[ToolDefinition],
    ) -> Result<RoundOutcome, ModelError> {
        let outcome = match mode {
            Mode::Blocking if tools.is_empty() => {
                let reply = self.model.chat(transcript).await?;
                RoundOutcome::Text {
                    text: reply.text,
                    thinking: reply.thinking,
                }
            }
            Mode::Blocking => self.model.chat_one_round(transcript, tools).await?,
            Mode::Streaming(sink) => {
                let mut on_chunk = |chunk: &str| {
                    sink.chunk(chunk);
                };
                let out = self
                    .model
                    .chat_stream(transcript, tools, &mut on_chunk)
                    .await?;
                if out.tool_calls.is_empty() {
                    RoundOutcome::Text {
                        text: out.text,
                        thinking: out.thinking,
                    }
                } else {
                    RoundOutcome::ToolCalls {
                        calls: out.tool_calls,
                        thinking: out.thinking,
                    }
                }
            }
        };

        match &outcome {
            RoundOutcome::Text { text, .. } if text.trim().is_empty() => Err(ModelError::Empty),
            RoundOutcome::ToolCalls { calls, .. } if calls.is_empty() => Err(ModelError::Empty),
            _ => Ok(outcome),
        }
    }

    /// Execute `calls` in order, appending one `tool` message and one step
    /// per call.
    async fn execute_round(
        &self,
        session: &mut TurnSession,
        tools: &LoadedTools,
        calls: Vec<ToolCallRequest>,
        iteration: usize,
    ) {
        session.begin_tool_round(&calls);

        for call in calls {
            let args = parse_arguments(&call.arguments);

            let (content, server_name) = match tools.binding(&call.name) {
                None => {
                    tracing::warn!(
                        request_id = %session.request_id(),
                        iteration = iteration,
                        tool_name = %call.name,
                        "Model requested an unknown tool"
                    );
                    (format!("Error: unknown tool \"{}\"", call.name), None)
                }
                Some(binding) => {
                    tracing::info!(
                        request_id = %session.request_id(),
                        iteration = iteration,
                        tool_id = %call.id,
                        tool_name = %call.name,
                        server = %binding.server_name,
                        "Executing tool call"
                    );
                    let content = match self.registry.call(binding, &call.name, args.clone()).await
                    {
                        Ok(text) => {
                            tracing::debug!(
                                request_id = %session.request_id(),
                                tool_name = %call.name,
                                result_length = text.len(),
                                "Tool call succeeded"
                            );
                            text
                        }
                        Err(e) => {
                            tracing::warn!(
                                request_id = %session.request_id(),
                                tool_name = %call.name,
                                server = %binding.server_name,
                                error = %e,
                                "Tool call failed"
                            );
                            format!("Error: {e}")
                        }
                    };
                    (content, Some(binding.server_name.clone()))
                }
            };

            let step = ReasoningStep::ToolCall {
                name: call.name.clone(),
                server_name,
                args: Some(args),
                result: Some(content.clone()),
            };
            session.record_tool_result(&call.id, content, step);
        }
    }
}

/// Parse model-supplied arguments. Anything that is not a JSON object,
/// including an empty string, becomes `{}`.
fn parse_arguments(raw: &str) -> Value {
    let empty = || Value::Object(serde_json::Map::new());
    if raw.trim().is_empty() {
        return empty();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) | Err(_) => {
            tracing::warn!(arguments_length = raw.len(), "Unparseable tool arguments, using {{}}");
            empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_fall_back_to_empty_object() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("   "), json!({}));
        assert_eq!(parse_arguments("{not json"), json!({}));
        assert_eq!(parse_arguments("[1, 2]"), json!({}));
        assert_eq!(
            parse_arguments(r#"{"location":"Paris"}"#),
            json!({"location": "Paris"})
        );
    }
}
