//! Stream error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// Broker rejected or refused the connection
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// A per-command deadline elapsed
    #[error("broker operation timed out: {0}")]
    Timeout(String),

    /// Consumer group problem (missing group, create failure)
    #[error("consumer group error: {0}")]
    Group(String),

    /// Unexpected reply shape
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),
}

impl From<deadpool_redis::PoolError> for StreamError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StreamError::Unavailable(err.to_string())
    }
}

impl StreamError {
    /// Timeout-class errors: the operation may simply be retried
    pub fn is_timeout(&self) -> bool {
        match self {
            StreamError::Timeout(_) => true,
            StreamError::Redis(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Missing consumer group (NOGROUP); the group can be recreated
    pub fn is_missing_group(&self) -> bool {
        match self {
            StreamError::Group(msg) => msg.contains("NOGROUP"),
            StreamError::Redis(e) => e.to_string().contains("NOGROUP"),
            _ => false,
        }
    }
}
