//! Reasoning steps shown alongside an answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of visible agent progress within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasoningStep {
    Thinking {
        text: String,
    },
    ToolCall {
        name: String,
        #[serde(
            rename = "serverName",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        server_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
}

impl ReasoningStep {
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking { text: text.into() }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }
}

/// Append-only list of steps for one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepLog {
    steps: Vec<ReasoningStep>,
}

impl StepLog {
    pub fn push(&mut self, step: ReasoningStep) {
        self.steps.push(step);
    }

    /// Push a thinking step unless `text` is empty.
    pub fn push_thinking(&mut self, text: Option<&str>) {
        if let Some(t) = text.map(str::trim).filter(|t| !t.is_empty()) {
            self.push(ReasoningStep::thinking(t));
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn as_slice(&self) -> &[ReasoningStep] {
        &self.steps
    }

    /// Steps pushed at or after `from`.
    pub fn since(&self, from: usize) -> &[ReasoningStep] {
        self.steps.get(from..).unwrap_or(&[])
    }

    pub fn into_vec(self) -> Vec<ReasoningStep> {
        self.steps
    }
}
