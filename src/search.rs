//! Wiki corpus search used to ground general answers.

use std::fmt::Write as _;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::Source;

/// Documents appended to the prompt per turn.
pub const CONTEXT_DOCUMENTS: usize = 3;

const CONTEXT_EXCERPT_CHARS: usize = 1_500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiDocument {
    pub id: String,
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredDocument {
    pub document: WikiDocument,
    pub score: usize,
}

#[async_trait]
pub trait DocumentSearch: Send + Sync {
    /// Up to `limit` documents with a positive score, best first.
    async fn search(&self, query: &str, limit: usize) -> Vec<ScoredDocument>;
}

/// In-memory keyword scorer.
///
/// Each query term (lowercased, at least two characters) scores three per
/// occurrence in the title and one per occurrence in the content.
#[derive(Debug, Clone, Default)]
pub struct KeywordSearch {
    documents: Vec<WikiDocument>,
}

impl KeywordSearch {
    pub fn new(documents: Vec<WikiDocument>) -> Self {
        Self { documents }
    }

    pub fn insert(&mut self, document: WikiDocument) {
        self.documents.push(document);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn score(terms: &[String], doc: &WikiDocument) -> usize {
        let title = doc.title.to_lowercase();
        let content = doc.content.to_lowercase();
        terms
            .iter()
            .map(|t| title.matches(t.as_str()).count() * 3 + content.matches(t.as_str()).count())
            .sum()
    }
}

fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(ToString::to_string)
        .collect()
}

#[async_trait]
impl DocumentSearch for KeywordSearch {
    async fn search(&self, query: &str, limit: usize) -> Vec<ScoredDocument> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<ScoredDocument> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let score = Self::score(&terms, doc);
                (score > 0).then(|| ScoredDocument {
                    document: doc.clone(),
                    score,
                })
            })
            .collect();
        // Stable: ties keep corpus order.
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(limit);
        scored
    }
}

/// Embedding search is not available; always empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticSearch;

#[async_trait]
impl DocumentSearch for SemanticSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Vec<ScoredDocument> {
        Vec::new()
    }
}

/// Prompt context and source list for `results`, or `None` when empty.
pub fn wiki_context(results: &[ScoredDocument]) -> Option<(String, Vec<Source>)> {
    if results.is_empty() {
        return None;
    }

    let mut context = String::from(
        "Relevant wiki documents (cite them by title when you use them):\n",
    );
    let mut sources = Vec::with_capacity(results.len());
    for (i, r) in results.iter().enumerate() {
        let doc = &r.document;
        let excerpt: String = doc.content.chars().take(CONTEXT_EXCERPT_CHARS).collect();
        let _ = write!(
            context,
            "\n[{}] {} ({})\n{}\n",
            i + 1,
            doc.title,
            doc.url,
            excerpt.trim()
        );
        sources.push(Source {
            title: doc.title.clone(),
            url: doc.url.clone(),
        });
    }
    Some((context, sources))
}
