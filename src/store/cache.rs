//! Response cache with per-entry TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::KvStore;

/// Default entry lifetime (24h).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const KEY_PREFIX: &str = "cache:";

/// A cached model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query: String,
    pub response: String,
    /// Unix milliseconds at store time.
    pub timestamp: i64,
    /// Lifetime in milliseconds.
    pub ttl: i64,
}

impl CacheEntry {
    /// `now - timestamp <= ttl`.
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp <= self.ttl
    }
}

/// Exact-query response cache.
///
/// Storage errors never fail a lookup: they are logged and treated as a miss.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(query: &str) -> String {
        format!("{KEY_PREFIX}{query}")
    }

    /// Fresh cached response for exactly `query`. Expired entries are
    /// deleted on the way out.
    pub async fn get(&self, query: &str) -> Option<String> {
        let key = Self::key(query);
        let value = match self.store.get(&key).await {
            Ok(v) => v?,
            Err(e) => {
                tracing::warn!(error = %e, "Response cache read failed");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable cache entry");
                self.delete_quietly(&key).await;
                return None;
            }
        };

        if entry.query != query || !entry.is_fresh(Utc::now().timestamp_millis()) {
            self.delete_quietly(&key).await;
            return None;
        }
        Some(entry.response)
    }

    pub async fn put(&self, query: &str, response: &str) {
        let entry = CacheEntry {
            query: query.to_string(),
            response: response.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            ttl: i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX),
        };
        let value = match serde_json::to_value(&entry) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Response cache encode failed");
                return;
            }
        };
        if let Err(e) = self.store.put(&Self::key(query), value).await {
            tracing::warn!(error = %e, "Response cache write failed");
        }
    }

    async fn delete_quietly(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::debug!(error = %e, "Cache entry delete failed");
        }
    }
}
