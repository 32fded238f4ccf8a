//! The currently open page.
//!
//! Extraction itself happens elsewhere; this module consumes a
//! [`PageSource`], retries while the page is still loading, rejects pages
//! with too little text, and builds the summarization prompt.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, PageError};
use crate::llm::ApiMessage;
use crate::store::Source;

/// Extracted page record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub id: String,
    pub url: String,
    pub title: String,
    pub content_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PageContent {
    pub fn source(&self) -> Source {
        Source {
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }
}

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn current_page(&self) -> Result<PageContent, PageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSettings {
    pub min_content_chars: usize,
    pub max_content_chars: usize,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            min_content_chars: 100,
            max_content_chars: 12_000,
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(300),
        }
    }
}

impl PageSettings {
    /// Delay before retry `attempt` (1-based): base, 2×base, 4×base, …
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.retry_base_delay.saturating_mul(1u32 << shift)
    }
}

/// Fetch the current page, retrying up to `retry_attempts` times in total.
pub async fn fetch_with_retry(
    source: &dyn PageSource,
    settings: &PageSettings,
) -> Result<PageContent, PageError> {
    let attempts = settings.retry_attempts.max(1);
    let mut attempt = 1;
    loop {
        match source.current_page().await {
            Ok(page) => return Ok(page),
            Err(e) if attempt < attempts => {
                let delay = settings.backoff_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Page not ready, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Page text ready for the prompt: rejected when shorter than
/// `min_content_chars`, cut to `max_content_chars`.
pub fn usable_content(page: &PageContent, settings: &PageSettings) -> Result<String, AgentError> {
    let text = page.content_text.trim();
    if text.chars().count() < settings.min_content_chars {
        return Err(AgentError::InsufficientPageContent {
            min_chars: settings.min_content_chars,
        });
    }
    Ok(match text.char_indices().nth(settings.max_content_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    })
}

/// Transcript for answering `question` from the page.
pub fn page_messages(
    base_prompt: &str,
    page: &PageContent,
    content: &str,
    question: &str,
) -> Vec<ApiMessage> {
    let system = format!(
        "{base_prompt}\n\n\
         Answer using only the content of the page the user is viewing. \
         If the page does not contain the answer, say so.\n\n\
         Page title: {}\nPage URL: {}\n\n--- PAGE CONTENT ---\n{content}\n--- END PAGE CONTENT ---",
        page.title, page.url
    );
    vec![ApiMessage::system(system), ApiMessage::user(question)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn page(text: &str) -> PageContent {
        PageContent {
            id: "1".into(),
            url: "https://wiki.example.com/p/1".into(),
            title: "Runbook".into(),
            content_text: text.into(),
            space_key: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PageSource for Flaky {
        async fn current_page(&self) -> Result<PageContent, PageError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(PageError("page still loading".into()))
            } else {
                Ok(page("ready"))
            }
        }
    }

    #[test]
    fn short_pages_are_rejected() {
        let settings = PageSettings::default();
        let err = usable_content(&page("   tiny   "), &settings).unwrap_err();
        assert_eq!(err.code(), "PAGE_TOO_SHORT");
    }

    #[test]
    fn long_pages_are_truncated_on_char_boundary() {
        let settings = PageSettings {
            min_content_chars: 1,
            max_content_chars: 3,
            ..PageSettings::default()
        };
        assert_eq!(usable_content(&page("ёжик"), &settings).unwrap(), "ёжи…");
        assert_eq!(usable_content(&page("ёж"), &settings).unwrap(), "ёж");
    }

    #[test]
    fn backoff_doubles() {
        let s = PageSettings::default();
        assert_eq!(s.backoff_for_attempt(1), Duration::from_millis(300));
        assert_eq!(s.backoff_for_attempt(3), Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_ready() {
        let src = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let got = fetch_with_retry(&src, &PageSettings::default()).await.unwrap();
        assert_eq!(got.content_text, "ready");
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_attempts() {
        let src = Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        assert!(fetch_with_retry(&src, &PageSettings::default()).await.is_err());
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn prompt_carries_page() {
        let p = page("body text");
        let msgs = page_messages("base", &p, "body text", "what is this?");
        match &msgs[0] {
            ApiMessage::System { content } => {
                assert!(content.starts_with("base"));
                assert!(content.contains("Runbook"));
                assert!(content.contains("body text"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(msgs[1], ApiMessage::user("what is this?"));
    }
}
