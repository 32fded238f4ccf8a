//! Per-turn state.
//!
//! A [`TurnSession`] is created when a turn starts, mutated only by the
//! orchestrator driving that turn, and dropped when the turn ends or is
//! cancelled. Only the [`TurnOutcome`] survives.

use std::collections::HashSet;

use uuid::Uuid;

use super::steps::{ReasoningStep, StepLog};
use crate::llm::{ApiMessage, ToolCallRequest};
use crate::store::{ChatMessage, ChatRole};

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub text: String,
    /// Thinking emitted with the final answer.
    pub thinking: Option<String>,
    /// Every step of the turn, in order.
    pub steps: Vec<ReasoningStep>,
}

impl TurnOutcome {
    pub fn into_message(self) -> ChatMessage {
        let mut msg = ChatMessage::new(ChatRole::Assistant, self.text);
        msg.thinking = self.thinking;
        msg.reasoning_steps = self.steps;
        msg
    }
}

/// Transcript and step log of one in-flight turn.
#[derive(Debug)]
pub struct TurnSession {
    request_id: String,
    transcript: Vec<ApiMessage>,
    steps: StepLog,
}

impl TurnSession {
    /// Start a transcript with the system prompt and the user message.
    pub fn new(system_prompt: String, user_text: &str) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            transcript: vec![ApiMessage::system(system_prompt), ApiMessage::user(user_text)],
            steps: StepLog::default(),
        }
    }

    /// Use `request_id` instead of a generated one.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn transcript(&self) -> &[ApiMessage] {
        &self.transcript
    }

    pub fn steps(&self) -> &StepLog {
        &self.steps
    }

    pub fn record_thinking(&mut self, thinking: Option<&str>) {
        self.steps.push_thinking(thinking);
    }

    /// Open a tool round: the assistant entry carrying exactly `calls`.
    pub fn begin_tool_round(&mut self, calls: &[ToolCallRequest]) {
        self.transcript.push(ApiMessage::tool_calls(calls.to_vec()));
    }

    /// Close one call of the open round.
    pub fn record_tool_result(&mut self, call_id: &str, content: String, step: ReasoningStep) {
        self.transcript
            .push(ApiMessage::tool_result(call_id, content));
        self.steps.push(step);
    }

    pub fn finish(mut self, text: String, thinking: Option<String>) -> TurnOutcome {
        self.record_thinking(thinking.as_deref());
        TurnOutcome {
            text,
            thinking,
            steps: self.steps.into_vec(),
        }
    }
}

/// Whether every `tool` message answers an id of the nearest preceding
/// assistant `tool_calls` list, each id exactly once.
pub fn transcript_is_paired(messages: &[ApiMessage]) -> bool {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&str> = Vec::new();

    for msg in messages {
        match msg {
            ApiMessage::Tool { tool_call_id, .. } => {
                let Some(pos) = pending.iter().position(|id| id == tool_call_id) else {
                    return false;
                };
                pending.swap_remove(pos);
            }
            ApiMessage::Assistant {
                content,
                tool_calls,
            } => {
                if content.is_none() && tool_calls.is_empty() {
                    return false;
                }
                pending.clear();
                for call in tool_calls {
                    if !seen_ids.insert(call.id.as_str()) {
                        return false;
                    }
                    pending.push(call.id.as_str());
                }
            }
            ApiMessage::System { .. } | ApiMessage::User { .. } => pending.clear(),
        }
    }
    true
}
