//! JSON-RPC over HTTP tool-server client.
//!
//! Every request is a single POST carrying `{jsonrpc, id, method, params}`.
//! Servers may answer with plain JSON or with an SSE body whose first `data:`
//! frame holds the response.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use crate::error::ToolError;
use crate::mcp::types::{
    CallToolResult, JSONRPC_VERSION, ListToolsResult, McpTool, PROTOCOL_VERSION, RpcRequest,
    RpcResponse,
};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

const SESSION_HEADER: &str = "mcp-session-id";
const MAX_LIST_PAGES: usize = 10;

struct RpcReply {
    result: Value,
    session_id: Option<String>,
}

/// Stateless JSON-RPC client shared by the registry and the tool invoker.
///
/// Cloning is cheap; clones share the connection pool and the request id
/// counter.
#[derive(Debug, Clone)]
pub struct McpHttpClient {
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
    handshake_timeout: Duration,
    call_timeout: Duration,
}

impl Default for McpHttpClient {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_CALL_TIMEOUT)
    }
}

impl McpHttpClient {
    /// Create a client; `handshake_timeout` bounds `initialize` and
    /// `tools/list`, `call_timeout` bounds `tools/call`.
    pub fn new(handshake_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            next_id: Arc::new(AtomicU64::new(1)),
            handshake_timeout,
            call_timeout,
        }
    }

    async fn request(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        session_id: Option<&str>,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<RpcReply, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        };

        let mut rb = self
            .http
            .post(url)
            .timeout(timeout)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(&body);
        for (k, v) in headers {
            rb = rb.header(k.as_str(), v.as_str());
        }
        if let Some(sid) = session_id {
            rb = rb.header(SESSION_HEADER, sid);
        }

        let resp = rb.send().await.map_err(|e| ToolError::from_reqwest(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RpcResponse>(extract_payload(&body))
                .ok()
                .and_then(|r| r.error)
                .and_then(|e| e.message);
            tracing::debug!(status = status.as_u16(), method, "Tool server returned error status");
            return Err(match message {
                Some(m) => ToolError::Rpc(m),
                None => ToolError::Http {
                    status: status.as_u16(),
                },
            });
        }
        let session_id = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let text = resp.text().await.map_err(|e| ToolError::from_reqwest(&e))?;

        let parsed: RpcResponse = serde_json::from_str(extract_payload(&text))
            .map_err(|e| ToolError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(ToolError::Rpc(err.message.unwrap_or_else(|| {
                format!("{method} failed with code {}", err.code.unwrap_or_default())
            })));
        }
        let result = parsed
            .result
            .ok_or_else(|| ToolError::InvalidResponse(format!("{method}: missing result")))?;

        Ok(RpcReply { result, session_id })
    }

    /// Handshake (`initialize`, then `tools/list`) and return every tool the
    /// server advertises.
    pub async fn list_tools(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Vec<McpTool>, ToolError> {
        let init = self
            .request(
                url,
                headers,
                None,
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
                self.handshake_timeout,
            )
            .await?;
        let session = init.session_id;

        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let reply = self
                .request(
                    url,
                    headers,
                    session.as_deref(),
                    "tools/list",
                    params,
                    self.handshake_timeout,
                )
                .await?;
            let page: ListToolsResult = serde_json::from_value(reply.result)
                .map_err(|e| ToolError::InvalidResponse(format!("tools/list: {e}")))?;
            out.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    /// Invoke `tool_name` and return its concatenated text content.
    pub async fn call_tool(
        &self,
        server_url: &str,
        tool_name: &str,
        args: Option<Value>,
        headers: &HashMap<String, String>,
    ) -> Result<String, ToolError> {
        if server_url.trim().is_empty() {
            return Err(ToolError::InvalidRequest(
                "Tool server URL is required".to_string(),
            ));
        }
        if tool_name.trim().is_empty() {
            return Err(ToolError::InvalidRequest("Tool name is required".to_string()));
        }

        let reply = self
            .request(
                server_url,
                headers,
                None,
                "tools/call",
                json!({
                    "name": tool_name,
                    "arguments": args.unwrap_or_else(|| json!({})),
                }),
                self.call_timeout,
            )
            .await?;

        let result: CallToolResult = serde_json::from_value(reply.result)
            .map_err(|e| ToolError::InvalidResponse(e.to_string()))?;
        let text = result
            .text()
            .ok_or_else(|| ToolError::InvalidResponse("missing content array".to_string()))?;

        if result.is_error {
            return Err(ToolError::Reported(if text.is_empty() {
                format!("tool {tool_name} reported an error")
            } else {
                text
            }));
        }
        Ok(text)
    }
}

/// The JSON-RPC payload of a response body: the body itself, or the first
/// non-empty `data:` frame of an SSE body.
fn extract_payload(body: &str) -> &str {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    body.lines()
        .filter_map(|l| l.trim().strip_prefix("data:"))
        .map(str::trim)
        .find(|d| !d.is_empty())
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_from_plain_json() {
        assert_eq!(extract_payload(" {\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn payload_from_sse() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        assert_eq!(
            extract_payload(body),
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}"
        );
    }

    #[tokio::test]
    async fn call_tool_validates_before_network() {
        let client = McpHttpClient::default();
        let headers = HashMap::new();
        let err = client.call_tool("", "x", None, &headers).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidRequest(_)));
        let err = client
            .call_tool("http://127.0.0.1:9", "  ", None, &headers)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidRequest(_)));
    }
}
