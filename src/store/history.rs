//! Append-only chat history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{KvStore, StoreError};
use crate::agent::ReasoningStep;

const HISTORY_KEY: &str = "chat_history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    /// A turn that ended in a fatal error; `content` is the message shown.
    Error,
}

/// A page or wiki document an answer drew on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

/// A user-facing message, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning_steps: Vec<ReasoningStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Error, content)
    }

    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            thinking: None,
            reasoning_steps: Vec::new(),
            sources: Vec::new(),
        }
    }
}

/// Chat history kept under a single key, in insertion order.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    store: Arc<dyn KvStore>,
}

impl ChatHistory {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<ChatMessage>, StoreError> {
        match self.store.get(HISTORY_KEY).await? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn append(&self, messages: &[ChatMessage]) -> Result<(), StoreError> {
        let mut all = self.list().await?;
        all.extend_from_slice(messages);
        self.store
            .put(HISTORY_KEY, serde_json::to_value(&all)?)
            .await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(HISTORY_KEY).await
    }
}
