//! Client-side fold of a turn's event stream into a renderable view.

use super::steps::ReasoningStep;
use crate::llm::think::parse_buffer;
use crate::normalized::AgentEvent;
use crate::store::ChatMessage;

/// What a display shows for an in-flight turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedView {
    pub thinking: Option<String>,
    pub answer: String,
    pub steps: Vec<ReasoningStep>,
}

/// Consumer-side merge of a streaming turn.
///
/// Chunks accumulate into the current round's buffer; a `ReasoningStep`
/// batch closes the round and clears it, so each round's thinking/answer
/// split is independent. [`StreamView::render`] may be called after every
/// event.
#[derive(Debug, Clone, Default)]
pub struct StreamView {
    request_id: Option<String>,
    buffer: String,
    steps: Vec<ReasoningStep>,
    done: Option<ChatMessage>,
    error: Option<(String, String)>,
}

impl StreamView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Start { request_id } => {
                *self = Self {
                    request_id: Some(request_id.clone()),
                    ..Self::default()
                };
            }
            AgentEvent::Chunk { text } => self.buffer.push_str(text),
            AgentEvent::ReasoningStep { steps } => {
                self.steps.extend_from_slice(steps);
                self.buffer.clear();
            }
            AgentEvent::Heartbeat => {}
            AgentEvent::Done { message } => self.done = Some(message.clone()),
            AgentEvent::Error { message, code } => {
                self.error = Some((message.clone(), code.clone()));
            }
        }
    }

    pub fn render(&self) -> RenderedView {
        let parsed = parse_buffer(&self.buffer);
        RenderedView {
            thinking: parsed.thinking,
            answer: parsed.answer,
            steps: self.steps.clone(),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// The completed message, once `Done` arrived.
    pub fn message(&self) -> Option<&ChatMessage> {
        self.done.as_ref()
    }

    /// `(message, code)` of a failed turn.
    pub fn error(&self) -> Option<(&str, &str)> {
        self.error
            .as_ref()
            .map(|(m, c)| (m.as_str(), c.as_str()))
    }

    pub fn is_finished(&self) -> bool {
        self.done.is_some() || self.error.is_some()
    }
}
