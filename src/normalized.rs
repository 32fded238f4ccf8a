//! Events emitted to the caller of a streaming turn.
//!
//! A streaming turn yields, in order:
//!
//! `Start` → `Chunk`* → (`ReasoningStep` → `Chunk`*)* → `Done` | `Error`
//!
//! with `Heartbeat` interleaved anywhere while the turn is in flight.
//! A `ReasoningStep` batch closes a tool round: consumers reset their
//! chunk buffer when it arrives (see [`crate::agent::StreamView`]).
//!
//! # Example
//!
//! ```rust
//! use pagewise::normalized::{AgentEvent, sse_event};
//!
//! let event = AgentEvent::Chunk {
//!     text: "Hello".to_string(),
//! };
//! let sse = sse_event(&event);
//! assert!(sse.starts_with("event: chunk\n"));
//! ```

use serde::{Deserialize, Serialize};

use crate::agent::ReasoningStep;
use crate::store::ChatMessage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// First event of every turn.
    Start {
        /// Unique identifier for this turn.
        request_id: String,
    },

    /// Raw model output for the current round, think markers included.
    Chunk { text: String },

    /// Steps produced by a round that called tools.
    ReasoningStep { steps: Vec<ReasoningStep> },

    /// Keepalive while a long round is in flight.
    Heartbeat,

    /// The turn completed with this message.
    Done { message: ChatMessage },

    /// The turn failed.
    Error {
        message: String,
        /// Stable code, see [`crate::error::AgentError::code`].
        code: String,
    },
}

impl AgentEvent {
    /// `Done` or `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Get the SSE event name for an [`AgentEvent`].
pub fn event_name(evt: &AgentEvent) -> &'static str {
    match evt {
        AgentEvent::Start { .. } => "start",
        AgentEvent::Chunk { .. } => "chunk",
        AgentEvent::ReasoningStep { .. } => "reasoning_step",
        AgentEvent::Heartbeat => "heartbeat",
        AgentEvent::Done { .. } => "done",
        AgentEvent::Error { .. } => "error",
    }
}

/// Convert an [`AgentEvent`] to an SSE-formatted string, with both an
/// `event:` line and a `data:` line carrying the JSON payload.
pub fn sse_event(evt: &AgentEvent) -> String {
    let json = serde_json::to_string(evt).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "message": e.to_string(), "code": "ENCODE" })
            .to_string()
    });

    let event_name = event_name(evt);

    format!("event: {event_name}\ndata: {json}\n\n")
}
