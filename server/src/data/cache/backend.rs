//! Cache backend trait definition

use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheError;

/// Cache backend trait
///
/// Defines the interface for cache implementations. Both the in-memory and
/// Redis backends implement this trait; workers and HTTP handlers only see
/// the typed service on top.
///
/// A missing key is a first-class `Ok(None)` / `Ok(false)` outcome, never an
/// error.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Replace a value atomically; TTL is absolute from write time
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Delete a key from the cache
    ///
    /// Returns `true` if the key existed before deletion, so callers can
    /// distinguish `removed` from `noop`.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), CacheError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
