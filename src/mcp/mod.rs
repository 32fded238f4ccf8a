//! Tool servers over a JSON-RPC (MCP-shaped) HTTP protocol.
//!
//! # Configuration
//!
//! Servers are configured as a JSON document, read on every turn so that
//! enabling or disabling a server takes effect immediately:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "weather": { "url": "http://localhost:8811/mcp" },
//!     "wiki": {
//!       "url": "https://tools.example.com/rpc",
//!       "headers": { "Authorization": "Bearer ${WIKI_TOKEN}" }
//!     }
//!   },
//!   "mcpEnabled": { "wiki": false }
//! }
//! ```
//!
//! # Tool names
//!
//! Tool names are flat. When two servers expose the same name, the server
//! listed first keeps it.

pub mod client;
pub mod config;
pub mod registry;
pub mod types;

pub use client::McpHttpClient;
pub use config::{FileToolConfig, RawToolConfig, StaticToolConfig, ToolConfigSource};
pub use registry::{LoadedTools, ToolRegistry, ToolServerBinding};
