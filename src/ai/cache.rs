//! Suggestion result caching.
//!
//! The router caches generated suggestions by context fingerprint so that
//! identical contexts within the TTL cost at most one inference. The cache
//! is a capability interface: production uses Redis, tests and brokerless
//! deployments use the in-memory map, and [`NoopCache`] disables caching
//! entirely. Backend failures never surface to the caller; the router logs
//! them and treats the lookup as a miss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::ai::{AiSuggestion, ContextFingerprint};

/// Cache backend failure. Degraded to a miss by the router.
#[derive(Debug, thiserror::Error)]
#[error("cache backend error: {0}")]
pub struct CacheError(pub String);

/// Key/value store of suggestions with per-entry TTL.
#[async_trait]
pub trait SuggestionCache: Send + Sync {
    /// Look up a cached suggestion. Expired entries are misses.
    async fn get(&self, key: &ContextFingerprint) -> Result<Option<AiSuggestion>, CacheError>;

    /// Cache a suggestion for `ttl`.
    async fn set(
        &self,
        key: &ContextFingerprint,
        suggestion: &AiSuggestion,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    suggestion: AiSuggestion,
    cached_at: SystemTime,
    ttl_secs: u64,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        self.cached_at
            .elapsed()
            .map_or(true, |elapsed| elapsed.as_secs() >= self.ttl_secs)
    }
}

/// In-memory TTL cache.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CachedEntry>>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired, not yet evicted) entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SuggestionCache for InMemoryCache {
    async fn get(&self, key: &ContextFingerprint) -> Result<Option<AiSuggestion>, CacheError> {
        let mut entries = self.entries.write().await;
        match entries.get(&key.0) {
            Some(entry) if entry.is_expired() => {
                entries.remove(&key.0);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.suggestion.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &ContextFingerprint,
        suggestion: &AiSuggestion,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries.write().await.insert(
            key.0.clone(),
            CachedEntry {
                suggestion: suggestion.clone(),
                cached_at: SystemTime::now(),
                ttl_secs: ttl.as_secs(),
            },
        );
        Ok(())
    }
}

/// Redis-backed cache using `SET EX` / `GET` on prefixed keys.
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Create a cache over an established Redis connection.
    #[must_use]
    pub fn new(conn: redis::aio::ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &ContextFingerprint) -> String {
        format!("{}:{}", self.key_prefix, key.0)
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

#[async_trait]
impl SuggestionCache for RedisCache {
    async fn get(&self, key: &ContextFingerprint) -> Result<Option<AiSuggestion>, CacheError> {
        use redis::AsyncCommands;

        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(self.key_for(key))
            .await
            .map_err(|e| CacheError(e.to_string()))?;

        match value {
            Some(json) => {
                let suggestion =
                    serde_json::from_str(&json).map_err(|e| CacheError(e.to_string()))?;
                Ok(Some(suggestion))
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &ContextFingerprint,
        suggestion: &AiSuggestion,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        use redis::AsyncCommands;

        let json = serde_json::to_string(suggestion).map_err(|e| CacheError(e.to_string()))?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(self.key_for(key), json, ttl.as_secs())
            .await
            .map_err(|e| CacheError(e.to_string()))?;

        Ok(())
    }
}

/// Cache that never hits and never stores. Disables caching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl SuggestionCache for NoopCache {
    async fn get(&self, _key: &ContextFingerprint) -> Result<Option<AiSuggestion>, CacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &ContextFingerprint,
        _suggestion: &AiSuggestion,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }
}
