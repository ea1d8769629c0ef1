// =============================================================================
// Application Identity
// =============================================================================

/// Default application name (overridable via APP_NAME)
pub const DEFAULT_APP_NAME: &str = "sploot-clustering";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for HTTP bind host
pub const ENV_HOST: &str = "HOST";

/// Environment variable for HTTP bind port
pub const ENV_PORT: &str = "PORT";

/// Environment variable for log level/filter (RUST_LOG also honored)
pub const ENV_LOG: &str = "LOG";

/// Environment variable for deployment environment name
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";

/// Environment variable for application name (diagnostics)
pub const ENV_APP_NAME: &str = "APP_NAME";

// =============================================================================
// Environment Variables - Redis Broker
// =============================================================================

pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_REDIS_USERNAME: &str = "REDIS_USERNAME";
pub const ENV_REDIS_PASSWORD: &str = "REDIS_PASSWORD";
pub const ENV_REDIS_SSL: &str = "REDIS_SSL";
pub const ENV_REDIS_SSL_CA_CERTS: &str = "REDIS_SSL_CA_CERTS";
pub const ENV_REDIS_POOL_MAX_CONNECTIONS: &str = "REDIS_POOL_MAX_CONNECTIONS";
pub const ENV_REDIS_SOCKET_TIMEOUT: &str = "REDIS_SOCKET_TIMEOUT";
pub const ENV_REDIS_SOCKET_CONNECT_TIMEOUT: &str = "REDIS_SOCKET_CONNECT_TIMEOUT";
pub const ENV_REDIS_HEALTHCHECK_INTERVAL: &str = "REDIS_HEALTHCHECK_INTERVAL";
pub const ENV_REDIS_RETRY_ON_TIMEOUT: &str = "REDIS_RETRY_ON_TIMEOUT";

// =============================================================================
// Environment Variables - Auth, Cache & Strategy
// =============================================================================

pub const ENV_INTERNAL_TOKEN: &str = "INTERNAL_TOKEN";
pub const ENV_NAMESPACE: &str = "NAMESPACE";
pub const ENV_CLUSTER_TTL_SECONDS: &str = "CLUSTER_TTL_SECONDS";
pub const ENV_MAX_CLUSTER_SIZE: &str = "MAX_CLUSTER_SIZE";

// =============================================================================
// Environment Variables - Stream & Worker
// =============================================================================

pub const ENV_CLUSTER_STREAM_KEY: &str = "CLUSTER_STREAM_KEY";
pub const ENV_CLUSTER_DEAD_LETTER_STREAM: &str = "CLUSTER_DEAD_LETTER_STREAM";
pub const ENV_CLUSTER_STREAM_MAXLEN: &str = "CLUSTER_STREAM_MAXLEN";
pub const ENV_CLUSTER_STREAM_APPROXIMATE_TRIM: &str = "CLUSTER_STREAM_APPROXIMATE_TRIM";
pub const ENV_CLUSTER_CONSUMER_GROUP: &str = "CLUSTER_CONSUMER_GROUP";
pub const ENV_CLUSTER_WORKER_CONSUMER_NAME: &str = "CLUSTER_WORKER_CONSUMER_NAME";
pub const ENV_CLUSTER_READ_TIMEOUT_MS: &str = "CLUSTER_READ_TIMEOUT_MS";
pub const ENV_CLUSTER_READ_COUNT: &str = "CLUSTER_READ_COUNT";
pub const ENV_CLUSTER_RETRY_IDLE_MS: &str = "CLUSTER_RETRY_IDLE_MS";
pub const ENV_CLUSTER_MAX_ATTEMPTS: &str = "CLUSTER_MAX_ATTEMPTS";
pub const ENV_CLUSTER_WORKER_COUNT: &str = "CLUSTER_WORKER_COUNT";
pub const ENV_CLUSTER_MAX_PENDING_PER_WORKER: &str = "CLUSTER_MAX_PENDING_PER_WORKER";

// =============================================================================
// Environment Variables - Metrics
// =============================================================================

pub const ENV_WORKER_METRICS_ENABLED: &str = "WORKER_METRICS_ENABLED";
pub const ENV_WORKER_METRICS_HOST: &str = "WORKER_METRICS_HOST";
pub const ENV_WORKER_METRICS_PORT: &str = "WORKER_METRICS_PORT";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default HTTP bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default HTTP bind port
pub const DEFAULT_PORT: u16 = 8080;

/// Default body limit for API requests (1 MB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Per-request handler timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Redis Defaults
// =============================================================================

/// Default Redis URL (works with Redis, Valkey, Dragonfly)
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

/// Default connection pool size
pub const DEFAULT_POOL_MAX_CONNECTIONS: u32 = 32;

/// Default per-command deadline in seconds
pub const DEFAULT_SOCKET_TIMEOUT_SECS: f64 = 5.0;

/// Default pool create/wait timeout in seconds
pub const DEFAULT_SOCKET_CONNECT_TIMEOUT_SECS: f64 = 5.0;

/// Default pool recycle (health check) cadence in seconds
pub const DEFAULT_HEALTHCHECK_INTERVAL_SECS: u64 = 30;

// =============================================================================
// Auth, Cache & Strategy Defaults
// =============================================================================

/// Placeholder token refused outside local/development environments
pub const DEFAULT_INTERNAL_TOKEN: &str = "changeme";

/// Default cache key namespace
pub const DEFAULT_NAMESPACE: &str = "sploot";

/// Default cluster descriptor TTL (24 hours)
pub const DEFAULT_CLUSTER_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Default per-cluster member bound
pub const DEFAULT_MAX_CLUSTER_SIZE: usize = 24;

// =============================================================================
// Stream & Worker Defaults
// =============================================================================

/// Default main job stream key
pub const DEFAULT_CLUSTER_STREAM_KEY: &str = "streams:media.cluster";

/// Default dead-letter stream key
pub const DEFAULT_DEAD_LETTER_STREAM: &str = "streams:media.cluster.deadletter";

/// Default MAXLEN trim threshold for the main stream (0 disables trimming)
pub const DEFAULT_STREAM_MAXLEN: u64 = 100_000;

/// Default consumer group name
pub const DEFAULT_CONSUMER_GROUP: &str = "media-clustering-workers";

/// Default XREADGROUP block timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;

/// Default XREADGROUP batch size
pub const DEFAULT_READ_COUNT: usize = 32;

/// Default minimum idle time before a pending message is reclaimed
pub const DEFAULT_RETRY_IDLE_MS: u64 = 60_000;

/// Default delivery attempts before dead-lettering
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default worker instances per process
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Default held-but-unacked threshold before a worker stops taking new reads
pub const DEFAULT_MAX_PENDING_PER_WORKER: u64 = 512;

/// Interval between reclaim passes in seconds
pub const CLAIM_INTERVAL_SECS: u64 = 30;

/// Maximum messages claimed per XAUTOCLAIM page
pub const CLAIM_PAGE_SIZE: usize = 100;

/// Consecutive broker errors before a worker gives up and fails the process
pub const FATAL_CONSECUTIVE_ERRORS: u32 = 8;

/// Cap for the worker's exponential error backoff in seconds
pub const MAX_BACKOFF_SECS: u64 = 30;

// =============================================================================
// Metrics Defaults
// =============================================================================

/// Default Prometheus listener host
pub const DEFAULT_METRICS_HOST: &str = "127.0.0.1";

/// Default Prometheus listener port
pub const DEFAULT_METRICS_PORT: u16 = 9464;

// =============================================================================
// Shutdown & Health
// =============================================================================

/// Graceful shutdown timeout in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Timeout for each broker health probe in milliseconds
pub const HEALTH_PROBE_TIMEOUT_MS: u64 = 1000;
