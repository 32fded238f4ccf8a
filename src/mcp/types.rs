//! JSON-RPC and tool-server wire types.

use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2025-03-26";

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpTool>,
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

/// `content` stays untyped so a non-array value can be reported as a
/// protocol violation instead of a decode error.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Concatenate text items in order; non-text items contribute nothing.
    /// `None` when `content` is missing or not an array.
    pub fn text(&self) -> Option<String> {
        let items = self.content.as_ref()?.as_array()?;
        Some(
            items
                .iter()
                .map(|item| {
                    let is_text = item
                        .get("type")
                        .and_then(serde_json::Value::as_str)
                        .is_none_or(|t| t == "text");
                    if is_text {
                        item.get("text")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("")
                    } else {
                        ""
                    }
                })
                .collect(),
        )
    }
}
