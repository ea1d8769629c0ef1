//! In-memory cache implementation using moka
//!
//! Used in tests and single-process development runs; the Redis backend is
//! the production binding.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::backend::CacheBackend;
use super::error::CacheError;

/// Bound on entries so a runaway producer cannot exhaust memory
const MAX_ENTRIES: u64 = 100_000;

/// Cache entry with its TTL
#[derive(Clone)]
struct CacheEntry {
    data: Vec<u8>,
    ttl: Duration,
}

/// Per-entry expiry tracking for variable TTLs
struct VariableTtlExpiry;

impl Expiry<String, CacheEntry> for VariableTtlExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_read(
        &self,
        _key: &String,
        _value: &CacheEntry,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        duration_until_expiry
    }
}

/// In-memory cache backend
pub struct InMemoryCache {
    cache: Cache<String, CacheEntry>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .expire_after(VariableTtlExpiry)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.data.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry { data: value, ttl };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let existed = self.cache.contains_key(key);
        self.cache.invalidate(key).await;
        Ok(existed)
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = InMemoryCache::new();

        cache.set("key1", b"value1".to_vec(), TTL).await.unwrap();
        let result = cache.get("key1").await.unwrap();
        assert_eq!(result, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_replaces() {
        let cache = InMemoryCache::new();

        cache.set("key1", b"old".to_vec(), TTL).await.unwrap();
        cache.set("key1", b"new".to_vec(), TTL).await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let cache = InMemoryCache::new();

        cache.set("key1", b"value1".to_vec(), TTL).await.unwrap();
        assert!(cache.delete("key1").await.unwrap());
        assert_eq!(cache.get("key1").await.unwrap(), None);
        assert!(!cache.delete("key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = InMemoryCache::new();

        cache
            .set("key1", b"value1".to_vec(), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(cache.get("key1").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_health_check() {
        let cache = InMemoryCache::new();
        assert!(cache.health_check().await.is_ok());
        assert_eq!(cache.backend_name(), "memory");
    }
}
