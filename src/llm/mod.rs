//! Language model client and message model.
//!
//! The [`ChatModel`] trait is the seam between the orchestrator and the model
//! endpoint. [`ChatCompletionsClient`] implements it against any
//! OpenAI-compatible `chat/completions` endpoint, in three modes:
//!
//! - [`ChatModel::chat`]: one blocking call, optionally served from the
//!   response cache
//! - [`ChatModel::chat_one_round`]: one call that yields either final text or
//!   a list of requested tool invocations
//! - [`ChatModel::chat_stream`]: a streamed call that reports every content
//!   chunk and may end in tool invocations
//!
//! # Example
//!
//! ```rust,ignore
//! use pagewise::llm::{ApiMessage, ChatCompletionsClient, ChatModel, LlmSettings};
//!
//! let client = ChatCompletionsClient::new(LlmSettings::local("qwen3:8b"));
//! let reply = client.chat(&[ApiMessage::user("Hello")]).await?;
//! ```

pub mod chat_completions;
pub mod endpoint;
pub mod think;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;

pub use chat_completions::ChatCompletionsClient;
pub use endpoint::EndpointType;

/// Model connection settings, resolved once per client.
#[derive(Clone)]
pub struct LlmSettings {
    /// Endpoint as configured by the user (bare host or full URL).
    pub endpoint: String,
    pub endpoint_type: EndpointType,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Whole-request timeout for blocking calls; idle timeout between
    /// chunks for streamed calls.
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("endpoint", &self.endpoint)
            .field("endpoint_type", &self.endpoint_type)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmSettings {
    /// Settings for a locally hosted OpenAI-compatible runtime.
    #[must_use]
    pub fn local(model: impl Into<String>) -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            endpoint_type: EndpointType::Standard,
            model: model.into(),
            api_key: None,
            temperature: Some(0.7),
            max_tokens: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// The URL requests are actually sent to.
    #[must_use]
    pub fn chat_url(&self) -> String {
        self.endpoint_type.resolve(&self.endpoint)
    }
}

/// A message in the transcript sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ApiMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    /// `content` is `None` only when `tool_calls` is non-empty.
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    /// Must follow an assistant message whose `tool_calls` contains
    /// `tool_call_id`.
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ApiMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Assistant turn that only requests tools.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            content: None,
            tool_calls: calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is the raw JSON string as produced by the model; it is parsed
/// by the orchestrator, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireToolCall", into = "WireToolCall")]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// `OpenAI` wire shape: `{id, type: "function", function: {name, arguments}}`.
#[derive(Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

fn function_type() -> String {
    "function".to_string()
}

pub(crate) fn synthesize_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Normalize wire arguments: strings pass through, objects are
/// re-serialized, null becomes empty.
pub(crate) fn arguments_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl From<WireToolCall> for ToolCallRequest {
    fn from(w: WireToolCall) -> Self {
        Self {
            id: if w.id.is_empty() {
                synthesize_call_id()
            } else {
                w.id
            },
            name: w.function.name,
            arguments: arguments_to_string(w.function.arguments),
        }
    }
}

impl From<ToolCallRequest> for WireToolCall {
    fn from(c: ToolCallRequest) -> Self {
        Self {
            id: c.id,
            call_type: function_type(),
            function: WireFunction {
                name: c.name,
                arguments: serde_json::Value::String(c.arguments),
            },
        }
    }
}

/// A callable tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDefinition {
    /// `OpenAI` function-tool JSON.
    pub fn to_openai_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description.as_deref().unwrap_or(""),
                "parameters": self
                    .parameters
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
            }
        })
    }
}

/// Result of a blocking call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub thinking: Option<String>,
    /// Served from the response cache.
    pub cached: bool,
}

/// Result of a single tool-capable round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The model produced its final answer.
    Text {
        text: String,
        thinking: Option<String>,
    },
    /// The model asked for tools; `thinking` is any reasoning emitted
    /// alongside the request.
    ToolCalls {
        calls: Vec<ToolCallRequest>,
        thinking: Option<String>,
    },
}

/// Result of a streamed call once the stream ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    pub text: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// An OpenAI-compatible chat model.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Single blocking call without tools. Implementations may serve this
    /// from a response cache keyed by the serialized transcript.
    async fn chat(&self, messages: &[ApiMessage]) -> Result<ChatReply, ModelError>;

    /// One round with `tools` offered (`tool_choice: "auto"` when non-empty).
    /// Never cached.
    async fn chat_one_round(
        &self,
        messages: &[ApiMessage],
        tools: &[ToolDefinition],
    ) -> Result<RoundOutcome, ModelError>;

    /// Streamed call; `on_chunk` is invoked synchronously for every content
    /// delta, in arrival order. Never cached.
    async fn chat_stream(
        &self,
        messages: &[ApiMessage],
        tools: &[ToolDefinition],
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<StreamOutcome, ModelError>;
}
