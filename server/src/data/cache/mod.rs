//! Cluster-state cache
//!
//! Keyed blob store with TTL and explicit delete, backed by the same broker
//! as the job stream. The typed service serializes descriptors as JSON (the
//! wire format internal readers consume) and treats a missing key as a
//! first-class outcome.

mod backend;
mod error;
mod key;
mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

pub use backend::CacheBackend;
pub use error::CacheError;
pub use key::CacheKey;
pub use memory::InMemoryCache;
pub use redis::RedisCache;

use crate::domain::cluster::ClusterDescriptor;

/// Typed cache for per-pet cluster descriptors
pub struct ClusterCache {
    backend: Arc<dyn CacheBackend>,
    namespace: String,
    ttl: Duration,
}

impl std::fmt::Debug for ClusterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCache")
            .field("backend", &self.backend.backend_name())
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ClusterCache {
    pub fn new(backend: Arc<dyn CacheBackend>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            ttl,
        }
    }

    /// Get the backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    fn key(&self, pet_id: &str) -> String {
        CacheKey::pet_cluster(&self.namespace, pet_id)
    }

    /// Fetch the latest descriptor for a pet; `None` means no cached state
    pub async fn get_descriptor(
        &self,
        pet_id: &str,
    ) -> Result<Option<ClusterDescriptor>, CacheError> {
        match self.backend.get(&self.key(pet_id)).await? {
            Some(bytes) => {
                let descriptor = serde_json::from_slice(&bytes)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                Ok(Some(descriptor))
            }
            None => Ok(None),
        }
    }

    /// Replace the descriptor for a pet with the configured TTL
    pub async fn put_descriptor(&self, descriptor: &ClusterDescriptor) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(descriptor)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.backend
            .set(&self.key(&descriptor.pet_id), bytes, self.ttl)
            .await
    }

    /// Authoritatively drop a pet's cached state; returns whether a value
    /// was removed so callers can report `removed` vs `noop`.
    pub async fn invalidate(&self, pet_id: &str) -> Result<bool, CacheError> {
        self.backend.delete(&self.key(pet_id)).await
    }

    /// Health check
    pub async fn health_check(&self) -> Result<(), CacheError> {
        self.backend.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::{Cluster, ClusterMember, ClusterMetrics};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn memory_cache() -> ClusterCache {
        ClusterCache::new(
            Arc::new(InMemoryCache::new()),
            "sploot",
            Duration::from_secs(60),
        )
    }

    fn sample_descriptor(pet_id: &str) -> ClusterDescriptor {
        let now = Utc::now();
        ClusterDescriptor {
            pet_id: pet_id.to_string(),
            clusters: vec![Cluster {
                id: format!("{pet_id}-cluster-0"),
                label: Some("L".to_string()),
                hero_image_id: "a".to_string(),
                members: vec![ClusterMember {
                    image_id: "a".to_string(),
                    score: 1.0,
                    position: 0,
                }],
            }],
            metrics: ClusterMetrics {
                coverage: BTreeMap::new(),
                quality_score: 1.0,
                processed_at: now,
                strategy_version: "heuristic-v1".to_string(),
            },
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_descriptor_roundtrip() {
        let cache = memory_cache();
        let descriptor = sample_descriptor("p1");

        cache.put_descriptor(&descriptor).await.unwrap();
        let fetched = cache.get_descriptor("p1").await.unwrap().unwrap();
        assert_eq!(fetched, descriptor);
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let cache = memory_cache();
        assert!(cache.get_descriptor("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_reports_removed_vs_noop() {
        let cache = memory_cache();
        let descriptor = sample_descriptor("p1");

        cache.put_descriptor(&descriptor).await.unwrap();
        assert!(cache.invalidate("p1").await.unwrap());
        assert!(cache.get_descriptor("p1").await.unwrap().is_none());
        assert!(!cache.invalidate("p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_namespaced() {
        let cache = memory_cache();
        assert_eq!(cache.key("p1"), "sploot:pets:p1:cluster");
    }
}
