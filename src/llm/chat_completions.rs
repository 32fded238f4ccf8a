//! OpenAI Chat Completions client.
//!
//! Implements [`ChatModel`] against any OpenAI-compatible `chat/completions`
//! endpoint: blocking, one-round (tool-capable) and streamed calls.

use std::collections::BTreeMap;

use futures::StreamExt;
use serde_json::Value;

use crate::error::ModelError;
use crate::store::ResponseCache;

use super::think::{THINK_CLOSE, THINK_OPEN, split_final};
use super::{
    ApiMessage, ChatModel, ChatReply, LlmSettings, RoundOutcome, StreamOutcome, ToolCallRequest,
    ToolDefinition, arguments_to_string, synthesize_call_id,
};

/// Accumulated state for a streaming tool call.
#[derive(Debug, Default)]
struct ToolAccum {
    id: Option<String>,
    name: Option<String>,
    args: String,
}

/// Client for an OpenAI-compatible Chat Completions endpoint.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    settings: LlmSettings,
    cache: Option<ResponseCache>,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("settings", &self.settings)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl ChatCompletionsClient {
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            cache: None,
        }
    }

    /// Serve [`ChatModel::chat`] from `cache` when possible.
    #[must_use]
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn timeout_secs(&self) -> u64 {
        self.settings.timeout.as_secs()
    }

    fn request_body(&self, messages: &[ApiMessage], tools: &[ToolDefinition], stream: bool) -> Value {
        let mut body = serde_json::json!({
            "model": self.settings.model,
            "messages": messages,
        });
        if let Some(t) = self.settings.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = self.settings.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolDefinition::to_openai_json).collect());
            body["tool_choice"] = Value::String("auto".to_string());
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ModelError> {
        let url = self.settings.chat_url();
        let secs = self.timeout_secs();

        let mut rb = self.http.post(&url).json(body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = tokio::time::timeout(self.settings.timeout, rb.send())
            .await
            .map_err(|_elapsed| ModelError::Timeout { secs })?
            .map_err(|e| ModelError::from_reqwest(&e, secs))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), url = %url, "Model endpoint returned error status");
            return Err(ModelError::Http {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }
        Ok(resp)
    }

    /// Non-streamed round trip returning the raw response JSON.
    async fn complete(&self, body: &Value) -> Result<Value, ModelError> {
        let secs = self.timeout_secs();
        let resp = self.post(body).await?;
        tokio::time::timeout(self.settings.timeout, resp.json::<Value>())
            .await
            .map_err(|_elapsed| ModelError::Timeout { secs })?
            .map_err(|e| ModelError::from_reqwest(&e, secs))
    }
}

#[async_trait::async_trait]
impl ChatModel for ChatCompletionsClient {
    async fn chat(&self, messages: &[ApiMessage]) -> Result<ChatReply, ModelError> {
        let body = self.request_body(messages, &[], false);
        let cache_key = body.to_string();

        if let Some(cache) = &self.cache {
            if let Some(raw) = cache.get(&cache_key).await {
                tracing::debug!(model = %self.settings.model, "Response cache hit");
                let (text, thinking) = split_final(&raw);
                return Ok(ChatReply {
                    text,
                    thinking,
                    cached: true,
                });
            }
        }

        let v = self.complete(&body).await?;
        let message = first_message(&v)?;
        let raw = message.get("content").and_then(Value::as_str).unwrap_or("");
        let (text, mut thinking) = split_final(raw);
        if thinking.is_none() {
            thinking = structured_reasoning(message);
        }
        if text.trim().is_empty() {
            return Err(ModelError::Empty);
        }

        if let Some(cache) = &self.cache {
            let entry = match &thinking {
                Some(t) => format!("{THINK_OPEN}{t}{THINK_CLOSE}{text}"),
                None => text.clone(),
            };
            cache.put(&cache_key, &entry).await;
        }

        Ok(ChatReply {
            text,
            thinking,
            cached: false,
        })
    }

    async fn chat_one_round(
        &self,
        messages: &[ApiMessage],
        tools: &[ToolDefinition],
    ) -> Result<RoundOutcome, ModelError> {
        let body = self.request_body(messages, tools, false);
        tracing::debug!(
            model = %self.settings.model,
            message_count = messages.len(),
            tool_count = tools.len(),
            "Sending one-round request"
        );
        let v = self.complete(&body).await?;
        parse_round(&v)
    }

    async fn chat_stream(
        &self,
        messages: &[ApiMessage],
        tools: &[ToolDefinition],
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<StreamOutcome, ModelError> {
        let body = self.request_body(messages, tools, true);
        let secs = self.timeout_secs();
        let resp = self.post(&body).await?;
        let byte_stream = resp.bytes_stream();
        futures::pin_mut!(byte_stream);

        let mut buf = Vec::<u8>::new();
        let mut state = StreamState::default();
        let mut done = false;

        'read: loop {
            let next = tokio::time::timeout(self.settings.timeout, byte_stream.next())
                .await
                .map_err(|_elapsed| ModelError::Timeout { secs })?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| ModelError::from_reqwest(&e, secs))?;
            buf.extend_from_slice(&chunk);

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line = buf.drain(..=pos).collect::<Vec<_>>();
                if state.handle_line(&String::from_utf8_lossy(&line), on_chunk)? {
                    done = true;
                    break 'read;
                }
            }
        }
        if !done && !buf.is_empty() {
            state.handle_line(&String::from_utf8_lossy(&buf), on_chunk)?;
        }

        state.finish(on_chunk)
    }
}

/// Incremental SSE state for one streamed round.
#[derive(Debug, Default)]
struct StreamState {
    raw: String,
    in_reasoning: bool,
    tool_accum: BTreeMap<usize, ToolAccum>,
    terminal_calls: Vec<ToolCallRequest>,
}

impl StreamState {
    fn emit(&mut self, text: &str, on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send)) {
        self.raw.push_str(text);
        on_chunk(text);
    }

    /// Returns `true` at the `[DONE]` sentinel.
    fn handle_line(
        &mut self,
        line: &str,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<bool, ModelError> {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(false);
        };
        let data = data.trim();
        if data == "[DONE]" {
            return Ok(true);
        }
        if data.is_empty() {
            return Ok(false);
        }

        let v: Value = serde_json::from_str(data)
            .map_err(|e| ModelError::Protocol(format!("bad stream frame: {e}")))?;
        if let Some(err) = v.get("error") {
            let msg = err
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| err.to_string(), ToString::to_string);
            return Err(ModelError::Protocol(msg));
        }

        let choice = &v["choices"][0];
        let delta = &choice["delta"];

        // Structured reasoning is folded into the marker form so a single
        // buffer parser renders both.
        if let Some(r) = reasoning_field(delta) {
            if !self.in_reasoning {
                self.in_reasoning = true;
                self.emit(THINK_OPEN, on_chunk);
            }
            self.emit(r, on_chunk);
        }

        if let Some(s) = delta.get("content").and_then(Value::as_str) {
            if !s.is_empty() {
                if self.in_reasoning {
                    self.in_reasoning = false;
                    self.emit(THINK_CLOSE, on_chunk);
                }
                self.emit(s, on_chunk);
            }
        }

        if let Some(arr) = delta.get("tool_calls").and_then(Value::as_array) {
            for tc in arr {
                let idx = tc
                    .get("index")
                    .and_then(Value::as_u64)
                    .and_then(|i| usize::try_from(i).ok())
                    .unwrap_or(0);
                let entry = self.tool_accum.entry(idx).or_default();
                if entry.id.is_none() {
                    entry.id = tc.get("id").and_then(Value::as_str).map(ToString::to_string);
                }
                let function = tc.get("function");
                if entry.name.is_none() {
                    entry.name = function
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .map(ToString::to_string);
                }
                match function.and_then(|f| f.get("arguments")) {
                    Some(Value::String(ad)) => entry.args.push_str(ad),
                    Some(other @ Value::Object(_)) => {
                        entry.args = arguments_to_string(other.clone());
                    }
                    _ => {}
                }
            }
        }

        // Some runtimes deliver the assembled message in a terminal frame.
        if let Some(Value::Array(calls)) = choice.get("message").and_then(|m| m.get("tool_calls")) {
            if !calls.is_empty() {
                self.terminal_calls = serde_json::from_value(Value::Array(calls.clone()))
                    .map_err(|e| ModelError::Protocol(format!("bad tool_calls: {e}")))?;
            }
        }

        Ok(false)
    }

    fn finish(
        mut self,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<StreamOutcome, ModelError> {
        if self.in_reasoning {
            self.emit(THINK_CLOSE, on_chunk);
        }

        let mut tool_calls: Vec<ToolCallRequest> = self
            .tool_accum
            .into_values()
            .filter_map(|acc| {
                let name = acc.name?;
                Some(ToolCallRequest {
                    id: acc.id.unwrap_or_else(synthesize_call_id),
                    name,
                    arguments: acc.args,
                })
            })
            .collect();
        if tool_calls.is_empty() {
            tool_calls = self.terminal_calls;
        }

        let (text, thinking) = split_final(&self.raw);
        if tool_calls.is_empty() && text.trim().is_empty() {
            return Err(ModelError::Empty);
        }

        Ok(StreamOutcome {
            text,
            thinking,
            tool_calls,
        })
    }
}

fn reasoning_field(v: &Value) -> Option<&str> {
    v.get("reasoning_content")
        .or_else(|| v.get("reasoning"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn structured_reasoning(message: &Value) -> Option<String> {
    reasoning_field(message)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn first_message(v: &Value) -> Result<&Value, ModelError> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ModelError::Protocol("missing choices[0].message".to_string()))
}

/// Interpret a non-streamed response as final text or tool calls.
fn parse_round(v: &Value) -> Result<RoundOutcome, ModelError> {
    let message = first_message(v)?;

    let calls: Vec<ToolCallRequest> = match message.get("tool_calls") {
        Some(Value::Array(arr)) if !arr.is_empty() => {
            serde_json::from_value(Value::Array(arr.clone()))
                .map_err(|e| ModelError::Protocol(format!("bad tool_calls: {e}")))?
        }
        _ => Vec::new(),
    };

    let raw = message.get("content").and_then(Value::as_str).unwrap_or("");
    let (text, marker_thinking) = split_final(raw);
    let thinking = structured_reasoning(message).or(marker_thinking);

    if !calls.is_empty() {
        return Ok(RoundOutcome::ToolCalls { calls, thinking });
    }
    if text.trim().is_empty() {
        return Err(ModelError::Empty);
    }
    Ok(RoundOutcome::Text { text, thinking })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(lines: &[&str]) -> Result<(StreamOutcome, Vec<String>), ModelError> {
        let mut chunks = Vec::new();
        let mut state = StreamState::default();
        let mut on_chunk = |s: &str| chunks.push(s.to_string());
        for line in lines {
            if state.handle_line(line, &mut on_chunk)? {
                break;
            }
        }
        let out = state.finish(&mut on_chunk)?;
        Ok((out, chunks))
    }

    #[test]
    fn parse_round_text() {
        let v = json!({"choices": [{"message": {"role": "assistant", "content": "<think>hmm</think>Hello"}}]});
        assert_eq!(
            parse_round(&v).unwrap(),
            RoundOutcome::Text {
                text: "Hello".into(),
                thinking: Some("hmm".into())
            }
        );
    }

    #[test]
    fn parse_round_tool_calls_keep_raw_arguments() {
        let v = json!({"choices": [{"message": {"content": null, "tool_calls": [
            {"id": "c1", "type": "function", "function": {"name": "get_weather", "arguments": "{not json"}}
        ]}}]});
        match parse_round(&v).unwrap() {
            RoundOutcome::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].arguments, "{not json");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_round_without_text_or_calls_is_error() {
        let v = json!({"choices": [{"message": {"content": null}}]});
        assert!(matches!(parse_round(&v), Err(ModelError::Empty)));
        let v = json!({"choices": []});
        assert!(matches!(parse_round(&v), Err(ModelError::Protocol(_))));
    }

    #[test]
    fn stream_accumulates_content() {
        let (out, chunks) = feed(&[
            r#"data: {"choices":[{"delta":{"content":"<think>a"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"b</think>"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
            "data: [DONE]",
        ])
        .unwrap();
        assert_eq!(chunks.concat(), "<think>ab</think>Hi");
        assert_eq!(out.text, "Hi");
        assert_eq!(out.thinking.as_deref(), Some("ab"));
        assert!(out.tool_calls.is_empty());
    }

    #[test]
    fn stream_tool_call_deltas_are_assembled() {
        let (out, _) = feed(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"get_weather","arguments":"{\"loc"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ation\":\"Paris\"}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
        ])
        .unwrap();
        assert_eq!(
            out.tool_calls,
            vec![ToolCallRequest {
                id: "c1".into(),
                name: "get_weather".into(),
                arguments: r#"{"location":"Paris"}"#.into(),
            }]
        );
    }

    #[test]
    fn stream_terminal_message_tool_calls() {
        let (out, _) = feed(&[
            r#"data: {"choices":[{"message":{"tool_calls":[{"id":"c9","function":{"name":"now","arguments":{}}}]}}]}"#,
        ])
        .unwrap();
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].name, "now");
        assert_eq!(out.tool_calls[0].arguments, "{}");
    }

    #[test]
    fn structured_reasoning_becomes_markers() {
        let (out, chunks) = feed(&[
            r#"data: {"choices":[{"delta":{"reasoning_content":"think hard"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"42"}}]}"#,
        ])
        .unwrap();
        assert_eq!(chunks.concat(), "<think>think hard</think>42");
        assert_eq!(out.thinking.as_deref(), Some("think hard"));
        assert_eq!(out.text, "42");
    }

    #[test]
    fn empty_stream_is_error() {
        assert!(matches!(feed(&["data: [DONE]"]), Err(ModelError::Empty)));
    }

    #[test]
    fn stream_error_frame_is_protocol_error() {
        let err = feed(&[r#"data: {"error":{"message":"model not found"}}"#]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid model response: model not found");
    }

    #[test]
    fn request_body_includes_tools_only_when_present() {
        let client = ChatCompletionsClient::new(LlmSettings::local("m"));
        let without = client.request_body(&[ApiMessage::user("hi")], &[], false);
        assert!(without.get("tools").is_none());
        assert!(without.get("tool_choice").is_none());

        let tools = vec![ToolDefinition {
            name: "now".into(),
            description: None,
            parameters: None,
        }];
        let with = client.request_body(&[ApiMessage::user("hi")], &tools, true);
        assert_eq!(with["tool_choice"], "auto");
        assert_eq!(with["tools"][0]["function"]["name"], "now");
        assert_eq!(with["stream"], true);
    }
}
