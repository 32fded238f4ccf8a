//! User-facing chat service.
//!
//! Routes each user turn through the page-content gate: questions about the
//! open page are answered from its text; everything else goes to the
//! orchestrator, grounded in wiki search results when a search backend is
//! attached. The user message and the terminal assistant (or error) message
//! are appended to the chat history.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::transport::{AgentEventStream, EventSink, spawn_turn};
use crate::agent::{Orchestrator, StepLog, TurnOutcome, is_about_current_page};
use crate::config::AppConfig;
use crate::error::{AgentError, ModelError};
use crate::llm::ChatCompletionsClient;
use crate::mcp::{FileToolConfig, McpHttpClient, StaticToolConfig, ToolConfigSource, ToolRegistry};
use crate::page::{PageSettings, PageSource, fetch_with_retry, page_messages, usable_content};
use crate::search::{CONTEXT_DOCUMENTS, DocumentSearch, wiki_context};
use crate::store::{
    ChatHistory, ChatMessage, JsonFileStore, KvStore, MemoryStore, ResponseCache, Source,
};

/// Front door for a chat surface: one call per user turn.
///
/// Cloning shares the history store, the model client and the tool registry.
#[derive(Clone)]
pub struct ChatService {
    orchestrator: Orchestrator,
    history: ChatHistory,
    page_source: Option<Arc<dyn PageSource>>,
    search: Option<Arc<dyn DocumentSearch>>,
    page_settings: PageSettings,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("orchestrator", &self.orchestrator)
            .field("history", &self.history)
            .field("page_source", &self.page_source.is_some())
            .field("search", &self.search.is_some())
            .field("page_settings", &self.page_settings)
            .finish()
    }
}

impl ChatService {
    /// Create a service with no page source and no wiki search.
    pub fn new(orchestrator: Orchestrator, history: ChatHistory) -> Self {
        Self {
            orchestrator,
            history,
            page_source: None,
            search: None,
            page_settings: PageSettings::default(),
        }
    }

    /// Wire a service from configuration: the Chat Completions client (with
    /// the response cache when enabled), the tool registry and the store.
    pub fn from_config(config: &AppConfig) -> Self {
        let store: Arc<dyn KvStore> = match &config.cache.path {
            Some(path) => Arc::new(JsonFileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };

        let mut client = ChatCompletionsClient::new(config.llm.settings());
        if config.cache.enabled {
            client = client.with_cache(ResponseCache::new(
                Arc::clone(&store),
                Duration::from_secs(config.cache.ttl_secs),
            ));
        }

        let source: Arc<dyn ToolConfigSource> = match &config.tools.config_path {
            Some(path) => Arc::new(FileToolConfig::new(path)),
            None => Arc::new(StaticToolConfig::empty()),
        };
        let registry = ToolRegistry::new(
            source,
            McpHttpClient::new(
                Duration::from_secs(config.tools.handshake_timeout_secs),
                Duration::from_secs(config.tools.call_timeout_secs),
            ),
        );

        let orchestrator = Orchestrator::new(Arc::new(client), registry)
            .with_base_prompt(config.agent.base_prompt.clone())
            .with_max_iterations(config.agent.max_iterations)
            .with_heartbeat(Duration::from_secs(config.agent.heartbeat_secs));

        Self::new(orchestrator, ChatHistory::new(store)).with_page_settings(config.page.settings())
    }

    /// Answer page questions from `source`.
    #[must_use]
    pub fn with_page_source(mut self, source: Arc<dyn PageSource>) -> Self {
        self.page_source = Some(source);
        self
    }

    /// Ground general questions in `search` results.
    #[must_use]
    pub fn with_search(mut self, search: Arc<dyn DocumentSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Override page retry and minimum-length settings.
    #[must_use]
    pub fn with_page_settings(mut self, settings: PageSettings) -> Self {
        self.page_settings = settings;
        self
    }

    /// The persisted conversation.
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Answer one user turn and persist it.
    pub async fn send(&self, text: &str) -> Result<ChatMessage, AgentError> {
        let result = self.answer(text, None).await;
        self.persist(text, &result).await;
        result
    }

    /// Answer one user turn as a stream of events; persisted on completion.
    /// A cancelled turn persists nothing.
    pub fn send_streaming(
        &self,
        text: impl Into<String>,
        cancel: CancellationToken,
    ) -> AgentEventStream {
        let service = self.clone();
        let text = text.into();
        spawn_turn(self.orchestrator.heartbeat(), cancel, move |sink| async move {
            let result = service.answer(&text, Some(&sink)).await;
            if !sink.is_cancelled() {
                service.persist(&text, &result).await;
            }
            result
        })
    }

    async fn answer(&self, text: &str, sink: Option<&EventSink>) -> Result<ChatMessage, AgentError> {
        if is_about_current_page(text) {
            if let Some(source) = &self.page_source {
                tracing::info!("Question is about the current page");
                return self.answer_from_page(source.as_ref(), text, sink).await;
            }
            tracing::debug!("Page question but no page source attached, using general chat");
        }

        let (context, sources) = self.wiki_context(text).await;
        let outcome = match sink {
            Some(sink) => {
                self.orchestrator
                    .run_with_sink(text, context.as_deref(), sink)
                    .await?
            }
            None => self.orchestrator.run(text, context.as_deref()).await?,
        };

        let mut message = outcome.into_message();
        message.sources = sources;
        Ok(message)
    }

    async fn wiki_context(&self, text: &str) -> (Option<String>, Vec<Source>) {
        let Some(search) = &self.search else {
            return (None, Vec::new());
        };
        let results = search.search(text, CONTEXT_DOCUMENTS).await;
        tracing::debug!(result_count = results.len(), "Wiki search complete");
        match wiki_context(&results) {
            Some((context, sources)) => (Some(context), sources),
            None => (None, Vec::new()),
        }
    }

    async fn answer_from_page(
        &self,
        source: &dyn PageSource,
        question: &str,
        sink: Option<&EventSink>,
    ) -> Result<ChatMessage, AgentError> {
        let page = fetch_with_retry(source, &self.page_settings).await?;
        let content = usable_content(&page, &self.page_settings)?;
        tracing::debug!(
            page_url = %page.url,
            content_length = content.len(),
            "Answering from page content"
        );

        let messages = page_messages(self.orchestrator.base_prompt(), &page, &content, question);
        let model = self.orchestrator.model();

        let (text, thinking) = match sink {
            None => {
                let reply = model.chat(&messages).await?;
                (reply.text, reply.thinking)
            }
            Some(sink) => {
                let mut on_chunk = |chunk: &str| {
                    sink.chunk(chunk);
                };
                let out = model.chat_stream(&messages, &[], &mut on_chunk).await?;
                (out.text, out.thinking)
            }
        };
        if text.trim().is_empty() {
            return Err(ModelError::Empty.into());
        }

        let mut steps = StepLog::default();
        steps.push_thinking(thinking.as_deref());
        let mut message = TurnOutcome {
            text,
            thinking,
            steps: steps.into_vec(),
        }
        .into_message();
        message.sources = vec![page.source()];
        Ok(message)
    }

    async fn persist(&self, text: &str, result: &Result<ChatMessage, AgentError>) {
        let reply = match result {
            Ok(message) => message.clone(),
            Err(AgentError::Cancelled) => return,
            Err(e) => ChatMessage::error(e.to_string()),
        };
        if let Err(e) = self
            .history
            .append(&[ChatMessage::user(text), reply])
            .await
        {
            tracing::warn!(error = %e, "Failed to persist chat history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_defaults() {
        let config = AppConfig::load_from(None).unwrap();
        let service = ChatService::from_config(&config);
        assert_eq!(service.orchestrator().heartbeat(), Duration::from_secs(15));
        assert!(format!("{service:?}").contains("ChatService"));
    }
}
