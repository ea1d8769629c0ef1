use std::path::PathBuf;

use clap::Parser;

use super::constants::{
    ENV_APP_NAME, ENV_CLUSTER_CONSUMER_GROUP, ENV_CLUSTER_DEAD_LETTER_STREAM,
    ENV_CLUSTER_MAX_ATTEMPTS, ENV_CLUSTER_MAX_PENDING_PER_WORKER, ENV_CLUSTER_READ_COUNT,
    ENV_CLUSTER_READ_TIMEOUT_MS, ENV_CLUSTER_RETRY_IDLE_MS, ENV_CLUSTER_STREAM_APPROXIMATE_TRIM,
    ENV_CLUSTER_STREAM_KEY, ENV_CLUSTER_STREAM_MAXLEN, ENV_CLUSTER_TTL_SECONDS,
    ENV_CLUSTER_WORKER_CONSUMER_NAME, ENV_CLUSTER_WORKER_COUNT, ENV_ENVIRONMENT, ENV_HOST,
    ENV_INTERNAL_TOKEN, ENV_MAX_CLUSTER_SIZE, ENV_NAMESPACE, ENV_PORT,
    ENV_REDIS_HEALTHCHECK_INTERVAL, ENV_REDIS_PASSWORD, ENV_REDIS_POOL_MAX_CONNECTIONS,
    ENV_REDIS_RETRY_ON_TIMEOUT, ENV_REDIS_SOCKET_CONNECT_TIMEOUT, ENV_REDIS_SOCKET_TIMEOUT,
    ENV_REDIS_SSL, ENV_REDIS_SSL_CA_CERTS, ENV_REDIS_URL, ENV_REDIS_USERNAME,
    ENV_WORKER_METRICS_ENABLED, ENV_WORKER_METRICS_HOST, ENV_WORKER_METRICS_PORT,
};

/// Command line interface with environment-variable fallbacks.
///
/// Every option can be supplied either as a flag or through the environment;
/// the environment is the usual channel in deployments.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "sploot-clustering")]
#[command(version, about = "Per-pet media clustering worker and internal API", long_about = None)]
pub struct Cli {
    /// HTTP bind host
    #[arg(long, short = 'H', env = ENV_HOST)]
    pub host: Option<String>,

    /// HTTP bind port
    #[arg(long, short = 'p', env = ENV_PORT)]
    pub port: Option<u16>,

    // Redis broker wiring
    /// Redis-compatible broker URL (redis:// or rediss://)
    #[arg(long, env = ENV_REDIS_URL)]
    pub redis_url: Option<String>,

    /// Redis ACL username (spliced into the URL when it carries no userinfo)
    #[arg(long, env = ENV_REDIS_USERNAME)]
    pub redis_username: Option<String>,

    /// Redis password
    #[arg(long, env = ENV_REDIS_PASSWORD)]
    pub redis_password: Option<String>,

    /// Force TLS (upgrades redis:// to rediss://)
    #[arg(long, env = ENV_REDIS_SSL)]
    pub redis_ssl: Option<bool>,

    /// CA bundle path for broker TLS
    #[arg(long, env = ENV_REDIS_SSL_CA_CERTS)]
    pub redis_ssl_ca_certs: Option<PathBuf>,

    /// Broker connection pool size
    #[arg(long, env = ENV_REDIS_POOL_MAX_CONNECTIONS)]
    pub redis_pool_max_connections: Option<u32>,

    /// Per-command broker deadline in seconds
    #[arg(long, env = ENV_REDIS_SOCKET_TIMEOUT)]
    pub redis_socket_timeout: Option<f64>,

    /// Pool create/wait timeout in seconds
    #[arg(long, env = ENV_REDIS_SOCKET_CONNECT_TIMEOUT)]
    pub redis_socket_connect_timeout: Option<f64>,

    /// Pool connection health check cadence in seconds
    #[arg(long, env = ENV_REDIS_HEALTHCHECK_INTERVAL)]
    pub redis_healthcheck_interval: Option<u64>,

    /// Treat broker timeouts as retryable instead of counting toward failure
    #[arg(long, env = ENV_REDIS_RETRY_ON_TIMEOUT)]
    pub redis_retry_on_timeout: Option<bool>,

    // Auth, cache & strategy
    /// Shared secret for the internal HTTP surface
    #[arg(long, env = ENV_INTERNAL_TOKEN)]
    pub internal_token: Option<String>,

    /// Cache key namespace
    #[arg(long, env = ENV_NAMESPACE)]
    pub namespace: Option<String>,

    /// Cluster descriptor TTL in seconds
    #[arg(long, env = ENV_CLUSTER_TTL_SECONDS)]
    pub cluster_ttl_seconds: Option<u64>,

    /// Maximum members per cluster
    #[arg(long, env = ENV_MAX_CLUSTER_SIZE)]
    pub max_cluster_size: Option<usize>,

    // Stream & worker
    /// Main job stream key
    #[arg(long, env = ENV_CLUSTER_STREAM_KEY)]
    pub cluster_stream_key: Option<String>,

    /// Dead-letter stream key
    #[arg(long, env = ENV_CLUSTER_DEAD_LETTER_STREAM)]
    pub cluster_dead_letter_stream: Option<String>,

    /// MAXLEN trim threshold for the main stream (0 disables trimming)
    #[arg(long, env = ENV_CLUSTER_STREAM_MAXLEN)]
    pub cluster_stream_maxlen: Option<u64>,

    /// Use approximate (~) MAXLEN trimming
    #[arg(long, env = ENV_CLUSTER_STREAM_APPROXIMATE_TRIM)]
    pub cluster_stream_approximate_trim: Option<bool>,

    /// Consumer group name
    #[arg(long, env = ENV_CLUSTER_CONSUMER_GROUP)]
    pub cluster_consumer_group: Option<String>,

    /// Consumer name base (a unique suffix is always appended)
    #[arg(long, env = ENV_CLUSTER_WORKER_CONSUMER_NAME)]
    pub cluster_worker_consumer_name: Option<String>,

    /// XREADGROUP block timeout in milliseconds
    #[arg(long, env = ENV_CLUSTER_READ_TIMEOUT_MS)]
    pub cluster_read_timeout_ms: Option<u64>,

    /// XREADGROUP batch size
    #[arg(long, env = ENV_CLUSTER_READ_COUNT)]
    pub cluster_read_count: Option<usize>,

    /// Minimum idle time before a pending message is reclaimed, in milliseconds
    #[arg(long, env = ENV_CLUSTER_RETRY_IDLE_MS)]
    pub cluster_retry_idle_ms: Option<u64>,

    /// Delivery attempts before a message is dead-lettered
    #[arg(long, env = ENV_CLUSTER_MAX_ATTEMPTS)]
    pub cluster_max_attempts: Option<u32>,

    /// Worker instances to run in this process
    #[arg(long, env = ENV_CLUSTER_WORKER_COUNT)]
    pub cluster_worker_count: Option<usize>,

    /// Held-but-unacked threshold before a worker reads no new messages
    #[arg(long, env = ENV_CLUSTER_MAX_PENDING_PER_WORKER)]
    pub cluster_max_pending_per_worker: Option<u64>,

    // Metrics
    /// Enable the Prometheus metrics listener
    #[arg(long, env = ENV_WORKER_METRICS_ENABLED)]
    pub worker_metrics_enabled: Option<bool>,

    /// Metrics listener host
    #[arg(long, env = ENV_WORKER_METRICS_HOST)]
    pub worker_metrics_host: Option<String>,

    /// Metrics listener port
    #[arg(long, env = ENV_WORKER_METRICS_PORT)]
    pub worker_metrics_port: Option<u16>,

    // Diagnostics
    /// Deployment environment (local, development, staging, production)
    #[arg(long, env = ENV_ENVIRONMENT)]
    pub environment: Option<String>,

    /// Application name for diagnostics
    #[arg(long, env = ENV_APP_NAME)]
    pub app_name: Option<String>,
}

/// Parse CLI arguments (and their environment fallbacks)
pub fn parse() -> Cli {
    Cli::parse()
}
