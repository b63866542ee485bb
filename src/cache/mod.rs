//! GET response cache
//!
//! Keyed by `"<METHOD>:<full url>"`. Only verified-successful results (no
//! error object, `response.ok()`) are ever stored. Reads are plain map lookups
//! and never wait on the network; refreshes run as background tasks and replace
//! an entry only when they succeed (stale-while-revalidate).
//!
//! Entries are detached [`RequestResult`] copies. Callers get their own handle
//! built around the copy, so nothing a caller does to its handle reaches the
//! store.
//!
//! The store is injectable: every `Client` holds a `ResponseCache`, defaulting
//! to the process-wide [`ResponseCache::global`] store. Entries are namespaced
//! by URL only, so clients sharing a store observe each other's entries.

use crate::error::FetchError;
use crate::types::{Method, RequestResult};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

/// Build the cache key for a request.
pub fn cache_key(method: &Method, url: &str) -> String {
    format!("{}:{}", method.as_str(), url)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: RequestResult,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    revalidating: HashSet<String>,
}

/// In-memory, process-lifetime response store.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    state: Arc<RwLock<CacheState>>,
}

static GLOBAL_CACHE: OnceLock<ResponseCache> = OnceLock::new();

impl ResponseCache {
    /// An isolated, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store shared by default across clients.
    pub fn global() -> &'static ResponseCache {
        GLOBAL_CACHE.get_or_init(ResponseCache::new)
    }

    /// Copy of the entry under `key`.
    pub fn get(&self, key: &str) -> Option<RequestResult> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.get(key).map(|e| e.result.clone())
    }

    /// When the entry under `key` was last written.
    pub fn stored_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.get(key).map(|e| e.stored_at)
    }

    /// Store `result` if it is successful. Returns whether anything was
    /// written.
    pub fn insert(&self, key: impl Into<String>, result: RequestResult) -> bool {
        let key = key.into();
        if !result.is_success() {
            tracing::trace!(target: "reqkit::cache", key = %key, "not caching unsuccessful result");
            return false;
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.insert(
            key.clone(),
            CacheEntry {
                result,
                stored_at: Utc::now(),
            },
        );
        tracing::debug!(target: "reqkit::cache", key = %key, "stored");
        true
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a background refresh for `key` is scheduled or running.
    pub fn is_revalidating(&self, key: &str) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.revalidating.contains(key)
    }

    /// Schedule a background refresh of `key` after `after`.
    ///
    /// At most one refresh per key is pending; returns `false` when one already
    /// is (or when no tokio runtime is available). A refresh that errors or
    /// yields an unsuccessful result leaves the cached entry untouched.
    pub fn revalidate<F, Fut>(&self, key: &str, after: Duration, refresh: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<RequestResult, FetchError>> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(target: "reqkit::cache", key, "no tokio runtime; skipping revalidation");
            return false;
        };
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if !state.revalidating.insert(key.to_string()) {
                tracing::trace!(target: "reqkit::cache", key, "revalidation already pending");
                return false;
            }
        }

        let cache = self.clone();
        let key = key.to_string();
        tracing::debug!(target: "reqkit::cache", key = %key, after_ms = after.as_millis() as u64, "revalidation scheduled");
        runtime.spawn(async move {
            tokio::time::sleep(after).await;
            match refresh().await {
                Ok(result) => {
                    if !cache.insert(key.clone(), result) {
                        tracing::debug!(target: "reqkit::cache", key = %key, "revalidation unsuccessful; keeping stale entry");
                    }
                }
                Err(e) => {
                    tracing::debug!(target: "reqkit::cache", key = %key, err = %e, "revalidation failed; keeping stale entry");
                }
            }
            let mut state = cache.state.write().unwrap_or_else(PoisonError::into_inner);
            state.revalidating.remove(&key);
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorStatus, RequestError};
    use crate::types::HttpResponse;
    use reqwest::header::HeaderMap;

    fn result(status: u16, body: serde_json::Value) -> RequestResult {
        RequestResult {
            loading: false,
            error: None,
            data: Some(body),
            response: Some(HttpResponse::new(
                status,
                "",
                "http://x/a",
                HeaderMap::new(),
                Vec::new(),
            )),
        }
    }

    #[test]
    fn key_is_method_and_url() {
        assert_eq!(cache_key(&Method::GET, "http://x/a?b=1"), "GET:http://x/a?b=1");
    }

    #[test]
    fn only_successful_results_are_stored() {
        let cache = ResponseCache::new();
        assert!(!cache.insert("k", result(404, serde_json::json!({}))));

        let mut failed = result(200, serde_json::json!({}));
        failed.error = Some(RequestError::new("x", ErrorStatus::NetworkError));
        assert!(!cache.insert("k", failed));
        assert!(cache.is_empty());

        assert!(cache.insert("k", result(200, serde_json::json!({"v": 1}))));
        assert_eq!(cache.len(), 1);
        assert!(cache.stored_at("k").is_some());
        assert_eq!(cache.get("k").unwrap().data, Some(serde_json::json!({"v": 1})));
    }

    #[test]
    fn entries_are_detached_copies() {
        let cache = ResponseCache::new();
        cache.insert("k", result(200, serde_json::json!({"v": 1})));

        let mut copy = cache.get("k").unwrap();
        copy.error = Some(RequestError::new("down", ErrorStatus::NetworkError));
        copy.data = None;

        let stored = cache.get("k").unwrap();
        assert!(stored.error.is_none());
        assert_eq!(stored.data, Some(serde_json::json!({"v": 1})));
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = ResponseCache::new();
        cache.insert("a", result(200, serde_json::json!(1)));
        cache.insert("b", result(200, serde_json::json!(2)));
        assert!(cache.invalidate("a"));
        assert!(!cache.contains("a"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn successful_revalidation_replaces_entry() {
        let cache = ResponseCache::new();
        cache.insert("k", result(200, serde_json::json!(1)));

        assert!(cache.revalidate("k", Duration::from_millis(5), || async {
            Ok(result(200, serde_json::json!(2)))
        }));
        // second schedule while pending is ignored
        assert!(!cache.revalidate("k", Duration::ZERO, || async {
            Ok(result(200, serde_json::json!(3)))
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("k").unwrap().data, Some(serde_json::json!(2)));
        assert!(!cache.is_revalidating("k"));
    }

    #[tokio::test]
    async fn failed_revalidation_keeps_stale_entry() {
        let cache = ResponseCache::new();
        cache.insert("k", result(200, serde_json::json!(1)));

        cache.revalidate("k", Duration::ZERO, || async {
            Err(FetchError::Request(RequestError::new("down", ErrorStatus::NetworkError)))
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").unwrap().data, Some(serde_json::json!(1)));

        cache.revalidate("k", Duration::ZERO, || async {
            Ok(result(500, serde_json::json!(9)))
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").unwrap().data, Some(serde_json::json!(1)));
    }
}
