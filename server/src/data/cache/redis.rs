//! Redis cache backend over the shared connection pool
//!
//! Plain GET / PSETEX / DEL keyed per pet; every command runs under the
//! configured socket deadline so a stuck broker surfaces as `Timeout`
//! instead of hanging a worker or handler.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::backend::CacheBackend;
use super::error::CacheError;
use crate::data::redis::RedisPool;

pub struct RedisCache {
    pool: RedisPool,
    /// Per-command deadline
    op_timeout: Duration,
}

impl RedisCache {
    pub fn new(pool: RedisPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout(format!("deadline {:?} exceeded", self.op_timeout)))?
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.with_deadline(async {
            let mut conn = self.pool.get().await?;
            let result: Option<Vec<u8>> = deadpool_redis::redis::cmd("GET")
                .arg(key)
                .query_async(&mut conn)
                .await?;
            Ok(result)
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.with_deadline(async {
            let mut conn = self.pool.get().await?;
            // PSETEX for millisecond precision; a sub-second TTL truncated by
            // as_secs() would otherwise become "no expiry".
            let ttl_ms: u64 = ttl.as_millis().try_into().unwrap_or(u64::MAX);
            let ttl_ms = ttl_ms.max(1);
            let _: () = deadpool_redis::redis::cmd("PSETEX")
                .arg(key)
                .arg(ttl_ms)
                .arg(value)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.with_deadline(async {
            let mut conn = self.pool.get().await?;
            let deleted: i64 = deadpool_redis::redis::cmd("DEL")
                .arg(key)
                .query_async(&mut conn)
                .await?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        self.with_deadline(async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| CacheError::Connection(e.to_string()))?;

            deadpool_redis::redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map_err(|e| CacheError::Connection(e.to_string()))?;

            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
