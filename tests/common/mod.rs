#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pagewise::error::ModelError;
use pagewise::llm::think::split_final;
use pagewise::llm::{
    ApiMessage, ChatModel, ChatReply, RoundOutcome, StreamOutcome, ToolCallRequest, ToolDefinition,
};
use pagewise::mcp::{McpHttpClient, StaticToolConfig, ToolRegistry};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Scripted model
// =============================================================================

/// One scripted model response.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Final text; think markers are split out.
    Text(String),
    /// Tool calls, optionally with thinking.
    Calls(Vec<ToolCallRequest>, Option<String>),
    /// Streamed chunks, then optional tool calls.
    Stream(Vec<String>, Vec<ToolCallRequest>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Chat,
    OneRound,
    Stream,
}

/// What the model was called with.
#[derive(Debug, Clone)]
pub struct Seen {
    pub entry: Entry,
    pub messages: Vec<ApiMessage>,
    pub tools: Vec<String>,
}

impl Seen {
    pub fn system_prompt(&self) -> &str {
        match self.messages.first() {
            Some(ApiMessage::System { content }) => content.as_str(),
            _ => "",
        }
    }

    pub fn tool_contents(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                ApiMessage::Tool { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }
}

/// A [`ChatModel`] that replays a script and records every call.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Reply>>,
    repeat: Option<Reply>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Reply>) -> Arc<Self> {
        pagewise::telemetry::try_init_for_tests();
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    /// Answers every call with `reply`.
    pub fn always(reply: Reply) -> Arc<Self> {
        pagewise::telemetry::try_init_for_tests();
        Arc::new(Self {
            repeat: Some(reply),
            ..Self::default()
        })
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn next(&self, entry: Entry, messages: &[ApiMessage], tools: &[ToolDefinition]) -> Option<Reply> {
        self.seen.lock().unwrap().push(Seen {
            entry,
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone())
    }
}

#[async_trait::async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, messages: &[ApiMessage]) -> Result<ChatReply, ModelError> {
        match self.next(Entry::Chat, messages, &[]) {
            Some(Reply::Text(raw)) => {
                let (text, thinking) = split_final(&raw);
                Ok(ChatReply {
                    text,
                    thinking,
                    cached: false,
                })
            }
            _ => Err(ModelError::Empty),
        }
    }

    async fn chat_one_round(
        &self,
        messages: &[ApiMessage],
        tools: &[ToolDefinition],
    ) -> Result<RoundOutcome, ModelError> {
        match self.next(Entry::OneRound, messages, tools) {
            Some(Reply::Text(raw)) => {
                let (text, thinking) = split_final(&raw);
                Ok(RoundOutcome::Text { text, thinking })
            }
            Some(Reply::Calls(calls, thinking)) => Ok(RoundOutcome::ToolCalls { calls, thinking }),
            _ => Err(ModelError::Empty),
        }
    }

    async fn chat_stream(
        &self,
        messages: &[ApiMessage],
        tools: &[ToolDefinition],
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<StreamOutcome, ModelError> {
        let (chunks, tool_calls) = match self.next(Entry::Stream, messages, tools) {
            Some(Reply::Text(raw)) => (vec![raw], Vec::new()),
            Some(Reply::Stream(chunks, calls)) => (chunks, calls),
            Some(Reply::Calls(calls, thinking)) => (
                thinking
                    .map(|t| vec![format!("<think>{t}</think>")])
                    .unwrap_or_default(),
                calls,
            ),
            None => return Err(ModelError::Empty),
        };
        for c in &chunks {
            on_chunk(c);
        }
        let (text, thinking) = split_final(&chunks.concat());
        Ok(StreamOutcome {
            text,
            thinking,
            tool_calls,
        })
    }
}

pub fn call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
    ToolCallRequest {
        id: id.into(),
        name: name.into(),
        arguments: arguments.into(),
    }
}

// =============================================================================
// Mock tool servers
// =============================================================================

pub fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

pub fn text_content(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

/// A server answering the handshake with `tools`.
pub async fn tool_server(tools: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(rpc_result(json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "mock", "version": "1.0.0"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(rpc_result(json!({ "tools": tools })))
        .mount(&server)
        .await;
    server
}

/// A weather server exposing `get_weather`, answering `text`.
pub async fn weather_server(text: &str) -> MockServer {
    let server = tool_server(json!([{
        "name": "get_weather",
        "description": "Current weather for a city",
        "inputSchema": {
            "type": "object",
            "properties": {"location": {"type": "string"}},
            "required": ["location"]
        }
    }]))
    .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": {"name": "get_weather"}
        })))
        .respond_with(rpc_result(text_content(text)))
        .mount(&server)
        .await;
    server
}

/// `{"mcpServers": {...}}` in the given order.
pub fn servers_doc(servers: &[(&str, &str)]) -> String {
    let body = servers
        .iter()
        .map(|(name, url)| format!(r#""{name}": {{"url": "{url}"}}"#))
        .collect::<Vec<_>>()
        .join(", ");
    format!(r#"{{"mcpServers": {{{body}}}}}"#)
}

/// An address nothing listens on.
pub const UNREACHABLE: &str = "http://127.0.0.1:1/mcp";

pub fn registry(doc: &str) -> ToolRegistry {
    pagewise::telemetry::try_init_for_tests();
    ToolRegistry::new(Arc::new(StaticToolConfig::new(doc)), McpHttpClient::default())
}

pub fn empty_registry() -> ToolRegistry {
    ToolRegistry::new(Arc::new(StaticToolConfig::empty()), McpHttpClient::default())
}
