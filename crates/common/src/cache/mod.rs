//! Search result cache
//!
//! Provides:
//! - Request key normalization and hashing
//! - An in-process TTL cache with a size ceiling (default)
//! - A Redis-backed cache sharing results across processes
//!
//! Both backends are last-writer-wins; concurrent recomputes of the same key
//! simply overwrite each other.

use crate::config::{CacheBackend, CacheConfig};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Hashed cache key for a normalized search request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn builder(query: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            query: normalize_query(query),
            parts: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates the request fields that distinguish cached results
pub struct CacheKeyBuilder {
    query: String,
    parts: Vec<(&'static str, String)>,
}

impl CacheKeyBuilder {
    pub fn part(mut self, name: &'static str, value: impl ToString) -> Self {
        self.parts.push((name, value.to_string()));
        self
    }

    pub fn build(self) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(self.query.as_bytes());
        for (name, value) in &self.parts {
            hasher.update([0u8]);
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        CacheKey(hex::encode(hasher.finalize()))
    }
}

/// Trim, collapse internal whitespace and lowercase
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Storage for ranked results keyed by request
#[async_trait]
pub trait ResultCache<V>: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<V>>;

    async fn put(&self, key: &CacheKey, value: V) -> Result<()>;

    fn name(&self) -> &'static str;
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// In-process TTL cache
///
/// Expired entries are dropped on read and by a sweep that runs when an
/// insert would exceed `max_entries`. If the sweep frees nothing, the oldest
/// entry is evicted.
pub struct MemoryCache<V> {
    entries: DashMap<CacheKey, Entry<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone + Send + Sync + 'static> MemoryCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        before.saturating_sub(self.entries.len())
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> ResultCache<V> for MemoryCache<V> {
    async fn get(&self, key: &CacheKey) -> Result<Option<V>> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                debug!(key = %key, "Cache hit");
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        debug!(key = %key, "Cache miss");
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, value: V) -> Result<()> {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            let swept = self.sweep_expired();
            if swept == 0 {
                self.evict_oldest();
            }
            debug!(swept, "Cache sweep");
        }
        self.entries.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis-backed cache storing JSON values with a server-side TTL
pub struct RedisCache<V> {
    connection: Mutex<MultiplexedConnection>,
    key_prefix: String,
    ttl_secs: u64,
    _value: PhantomData<fn() -> V>,
}

impl<V> RedisCache<V> {
    pub async fn connect(url: &str, key_prefix: &str, ttl_secs: u64) -> Result<Self> {
        let client = Client::open(url).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection: Mutex::new(connection),
            key_prefix: key_prefix.to_string(),
            ttl_secs: ttl_secs.max(1),
            _value: PhantomData,
        })
    }

    fn key(&self, key: &CacheKey) -> String {
        format!("{}:search:{}", self.key_prefix, key)
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.lock().await;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

#[async_trait]
impl<V> ResultCache<V> for RedisCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Result<Option<V>> {
        let full_key = self.key(key);
        let mut conn = self.connection.lock().await;

        let value: Option<String> = conn.get(&full_key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to get key '{}': {}", full_key, e),
        })?;

        match value {
            Some(json) => {
                let parsed = serde_json::from_str(&json).map_err(|e| AppError::CacheError {
                    message: format!("Failed to parse cached value: {}", e),
                })?;
                debug!(key = %full_key, "Cache hit");
                Ok(Some(parsed))
            }
            None => {
                debug!(key = %full_key, "Cache miss");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, value: V) -> Result<()> {
        let full_key = self.key(key);
        let json = serde_json::to_string(&value).map_err(|e| AppError::CacheError {
            message: format!("Failed to serialize value: {}", e),
        })?;

        let mut conn = self.connection.lock().await;
        conn.set_ex::<_, _, ()>(&full_key, &json, self.ttl_secs)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set key '{}': {}", full_key, e),
            })?;

        debug!(key = %full_key, ttl_secs = self.ttl_secs, "Cache set");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Create the configured result cache; `None` when caching is disabled
pub async fn create_cache<V>(config: &CacheConfig) -> Result<Option<Arc<dyn ResultCache<V>>>>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    if !config.enabled {
        return Ok(None);
    }
    let cache: Arc<dyn ResultCache<V>> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new(
            Duration::from_secs(config.ttl_secs),
            config.max_entries,
        )),
        CacheBackend::Redis => {
            let cache = RedisCache::connect(&config.redis_url, &config.key_prefix, config.ttl_secs).await?;
            cache.ping().await?;
            Arc::new(cache)
        }
    };
    Ok(Some(cache))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(q: &str) -> CacheKey {
        CacheKey::builder(q).part("strategy", "hybrid").part("top_k", 10).build()
    }

    #[test]
    fn test_normalized_queries_share_a_key() {
        assert_eq!(key("  南开大学   图书馆 "), key("南开大学 图书馆"));
        assert_eq!(key("Nankai University"), key("nankai   university"));
        assert_ne!(key("nankai"), key("nankai library"));
    }

    #[test]
    fn test_key_parts_are_significant() {
        let a = CacheKey::builder("q").part("top_k", 10).build();
        let b = CacheKey::builder("q").part("top_k", 5).build();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_memory_cache_hit_and_overwrite() {
        let cache = MemoryCache::new(Duration::from_secs(60), 10);
        let k = key("q");
        assert_eq!(cache.get(&k).await.unwrap(), None::<u32>);

        cache.put(&k, 1u32).await.unwrap();
        cache.put(&k, 2u32).await.unwrap();
        assert_eq!(cache.get(&k).await.unwrap(), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new(Duration::from_millis(20), 10);
        let k = key("q");
        cache.put(&k, "v".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get(&k).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_memory_cache_respects_ceiling() {
        let cache = MemoryCache::new(Duration::from_secs(60), 3);
        for i in 0..10u32 {
            cache.put(&key(&format!("q{i}")), i).await.unwrap();
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&key("q9")).await.unwrap(), Some(9));
        assert_eq!(cache.get(&key("q0")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let disabled = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(create_cache::<u32>(&disabled).await.unwrap().is_none());

        let config = CacheConfig {
            backend: CacheBackend::Memory,
            max_entries: 2,
            ..CacheConfig::default()
        };
        let cache = create_cache::<u32>(&config).await.unwrap().unwrap();
        assert_eq!(cache.name(), "memory");
        for i in 0..5u32 {
            cache.put(&key(&format!("q{i}")), i).await.unwrap();
        }
        assert_eq!(cache.get(&key("q4")).await.unwrap(), Some(4));
        assert_eq!(cache.get(&key("q0")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_cache_reports_unreachable_redis() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: "redis://127.0.0.1:1".to_string(),
            ..CacheConfig::default()
        };
        let err = create_cache::<u32>(&config).await.err().unwrap();
        assert!(matches!(err, AppError::CacheError { .. }));
    }
}
