//! Pagewise
//!
//! A client-side assistant for chatting about the open web page (and
//! optionally a wiki corpus) with an OpenAI-compatible language model that
//! can call external tools over a JSON-RPC protocol.
//!
//! # Architecture
//!
//! - **Gate**: phrase matching decides whether a turn is about the open page
//! - **Orchestrator**: bounded model → tools → model loop, blocking or
//!   streaming, with reasoning steps alongside the answer
//! - **Tool servers**: loaded fresh every turn; an unreachable server is
//!   skipped, a failing call becomes the tool's result text
//! - **Streaming**: events over a channel with heartbeats and cancellation
//!
//! # Modules
//!
//! - [`agent`]: gate, prompts, orchestration loop, stream merge view
//! - [`llm`]: message model, `ChatModel` seam, Chat Completions client
//! - [`mcp`]: tool-server configuration, JSON-RPC client, registry
//! - [`normalized`]: streaming event model
//! - [`page`]: page-content collaborator, retries, summarization prompt
//! - [`search`]: wiki keyword search
//! - [`store`]: key-value store, response cache, chat history
//! - [`service`]: the entry point tying it together
//! - [`config`], [`error`], [`telemetry`]: ambient plumbing

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod normalized;
pub mod page;
pub mod search;
pub mod service;
pub mod store;
pub mod telemetry;

pub use agent::{Orchestrator, ReasoningStep, StreamView, TurnOutcome};
pub use config::AppConfig;
pub use error::{AgentError, ConfigError, ModelError, PageError, ToolError};
pub use normalized::AgentEvent;
pub use service::ChatService;
