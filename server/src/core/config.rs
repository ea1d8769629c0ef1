use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use super::cli::Cli;
use super::constants::{
    DEFAULT_APP_NAME, DEFAULT_CLUSTER_STREAM_KEY, DEFAULT_CLUSTER_TTL_SECONDS,
    DEFAULT_CONSUMER_GROUP, DEFAULT_DEAD_LETTER_STREAM, DEFAULT_HEALTHCHECK_INTERVAL_SECS,
    DEFAULT_HOST, DEFAULT_INTERNAL_TOKEN, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CLUSTER_SIZE,
    DEFAULT_MAX_PENDING_PER_WORKER, DEFAULT_METRICS_HOST, DEFAULT_METRICS_PORT,
    DEFAULT_NAMESPACE, DEFAULT_POOL_MAX_CONNECTIONS, DEFAULT_PORT, DEFAULT_READ_COUNT,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_REDIS_URL, DEFAULT_RETRY_IDLE_MS,
    DEFAULT_SOCKET_CONNECT_TIMEOUT_SECS, DEFAULT_SOCKET_TIMEOUT_SECS, DEFAULT_STREAM_MAXLEN,
    DEFAULT_WORKER_COUNT,
};

// =============================================================================
// Deployment Environment
// =============================================================================

/// Deployment environment, used for guardrails and log formatting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    Local,
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "local" => Environment::Local,
            "staging" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// Whether relaxed defaults (placeholder token, console logs) are allowed
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Local | Environment::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Local => write!(f, "local"),
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Runtime Config Structs
// =============================================================================

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Redis broker configuration (shared by streams, cache and health probes)
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Final connection URL with credentials and scheme applied
    pub url: String,
    /// CA bundle path for TLS deployments
    pub ssl_ca_certs: Option<PathBuf>,
    pub pool_max_connections: u32,
    /// Per-command deadline
    pub socket_timeout: Duration,
    /// Pool create/wait timeout
    pub connect_timeout: Duration,
    /// Pool recycle (health check) cadence
    pub healthcheck_interval: Duration,
    /// Timeouts do not count toward the worker's fatal error threshold
    pub retry_on_timeout: bool,
}

/// Internal HTTP auth configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub internal_token: String,
}

/// Cache & strategy configuration
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub namespace: String,
    pub ttl: Duration,
    pub max_cluster_size: usize,
}

/// Stream & worker configuration
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub stream_key: String,
    pub dead_letter_stream: String,
    /// 0 disables trimming
    pub maxlen: u64,
    pub approximate_trim: bool,
    pub consumer_group: String,
    /// Base for consumer names; a process/worker suffix is always appended
    pub consumer_name_base: Option<String>,
    pub read_timeout_ms: u64,
    pub read_count: usize,
    pub retry_idle_ms: u64,
    pub max_attempts: u32,
    pub worker_count: usize,
    pub max_pending_per_worker: u64,
}

/// Metrics listener configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub cache: CacheSettings,
    pub stream: StreamSettings,
    pub metrics: MetricsConfig,
    pub environment: Environment,
    pub app_name: String,
}

impl AppConfig {
    /// Load configuration from CLI arguments and their env fallbacks
    pub fn load(cli: &Cli) -> Result<Self> {
        let environment = cli
            .environment
            .as_deref()
            .map(Environment::parse)
            .unwrap_or_default();

        let socket_timeout = cli.redis_socket_timeout.unwrap_or(DEFAULT_SOCKET_TIMEOUT_SECS);
        let connect_timeout = cli
            .redis_socket_connect_timeout
            .unwrap_or(DEFAULT_SOCKET_CONNECT_TIMEOUT_SECS);
        if !socket_timeout.is_finite() || socket_timeout <= 0.0 {
            anyhow::bail!("Configuration error: REDIS_SOCKET_TIMEOUT must be a positive number");
        }
        if !connect_timeout.is_finite() || connect_timeout <= 0.0 {
            anyhow::bail!(
                "Configuration error: REDIS_SOCKET_CONNECT_TIMEOUT must be a positive number"
            );
        }

        let redis_url = build_redis_url(
            cli.redis_url.as_deref().unwrap_or(DEFAULT_REDIS_URL),
            cli.redis_username.as_deref(),
            cli.redis_password.as_deref(),
            cli.redis_ssl.unwrap_or(false),
        );

        let config = Self {
            server: ServerConfig {
                host: cli.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: cli.port.unwrap_or(DEFAULT_PORT),
            },
            redis: RedisConfig {
                url: redis_url,
                ssl_ca_certs: cli.redis_ssl_ca_certs.clone(),
                pool_max_connections: cli
                    .redis_pool_max_connections
                    .unwrap_or(DEFAULT_POOL_MAX_CONNECTIONS),
                socket_timeout: Duration::from_secs_f64(socket_timeout),
                connect_timeout: Duration::from_secs_f64(connect_timeout),
                healthcheck_interval: Duration::from_secs(
                    cli.redis_healthcheck_interval
                        .unwrap_or(DEFAULT_HEALTHCHECK_INTERVAL_SECS),
                ),
                retry_on_timeout: cli.redis_retry_on_timeout.unwrap_or(false),
            },
            auth: AuthConfig {
                internal_token: cli
                    .internal_token
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INTERNAL_TOKEN.to_string()),
            },
            cache: CacheSettings {
                namespace: cli
                    .namespace
                    .clone()
                    .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
                ttl: Duration::from_secs(
                    cli.cluster_ttl_seconds.unwrap_or(DEFAULT_CLUSTER_TTL_SECONDS),
                ),
                max_cluster_size: cli.max_cluster_size.unwrap_or(DEFAULT_MAX_CLUSTER_SIZE),
            },
            stream: StreamSettings {
                stream_key: cli
                    .cluster_stream_key
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLUSTER_STREAM_KEY.to_string()),
                dead_letter_stream: cli
                    .cluster_dead_letter_stream
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DEAD_LETTER_STREAM.to_string()),
                maxlen: cli.cluster_stream_maxlen.unwrap_or(DEFAULT_STREAM_MAXLEN),
                approximate_trim: cli.cluster_stream_approximate_trim.unwrap_or(true),
                consumer_group: cli
                    .cluster_consumer_group
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
                consumer_name_base: cli.cluster_worker_consumer_name.clone(),
                read_timeout_ms: cli.cluster_read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
                read_count: cli.cluster_read_count.unwrap_or(DEFAULT_READ_COUNT),
                retry_idle_ms: cli.cluster_retry_idle_ms.unwrap_or(DEFAULT_RETRY_IDLE_MS),
                max_attempts: cli.cluster_max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                worker_count: cli.cluster_worker_count.unwrap_or(DEFAULT_WORKER_COUNT),
                max_pending_per_worker: cli
                    .cluster_max_pending_per_worker
                    .unwrap_or(DEFAULT_MAX_PENDING_PER_WORKER),
            },
            metrics: MetricsConfig {
                enabled: cli.worker_metrics_enabled.unwrap_or(true),
                host: cli
                    .worker_metrics_host
                    .clone()
                    .unwrap_or_else(|| DEFAULT_METRICS_HOST.to_string()),
                port: cli.worker_metrics_port.unwrap_or(DEFAULT_METRICS_PORT),
            },
            environment,
            app_name: cli
                .app_name
                .clone()
                .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
        };

        config.validate()?;

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            environment = %config.environment,
            stream = %config.stream.stream_key,
            group = %config.stream.consumer_group,
            workers = config.stream.worker_count,
            ttl_secs = config.cache.ttl.as_secs(),
            metrics_enabled = config.metrics.enabled,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: HOST must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: PORT must be greater than 0");
        }
        if self.metrics.enabled {
            if self.metrics.port == 0 {
                anyhow::bail!("Configuration error: WORKER_METRICS_PORT must be greater than 0");
            }
            if self.metrics.port == self.server.port && self.metrics.host == self.server.host {
                anyhow::bail!(
                    "Configuration error: PORT ({}) and WORKER_METRICS_PORT ({}) cannot be the same",
                    self.server.port,
                    self.metrics.port
                );
            }
        }

        // The placeholder secret is refused outside local/development
        if !self.environment.is_development()
            && (self.auth.internal_token.is_empty()
                || self.auth.internal_token == DEFAULT_INTERNAL_TOKEN)
        {
            anyhow::bail!(
                "Configuration error: INTERNAL_TOKEN must be set to a real secret in {}",
                self.environment
            );
        }

        if let Some(path) = &self.redis.ssl_ca_certs {
            if !self.redis.url.starts_with("rediss://") {
                anyhow::bail!(
                    "Configuration error: REDIS_SSL_CA_CERTS requires REDIS_SSL=true"
                );
            }
            if !path.exists() {
                anyhow::bail!(
                    "Configuration error: REDIS_SSL_CA_CERTS not found: {}",
                    path.display()
                );
            }
        }

        if self.cache.ttl.is_zero() {
            anyhow::bail!("Configuration error: CLUSTER_TTL_SECONDS must be greater than 0");
        }
        if self.cache.max_cluster_size == 0 {
            anyhow::bail!("Configuration error: MAX_CLUSTER_SIZE must be greater than 0");
        }
        if self.stream.max_attempts == 0 {
            anyhow::bail!("Configuration error: CLUSTER_MAX_ATTEMPTS must be greater than 0");
        }
        if self.stream.worker_count == 0 {
            anyhow::bail!("Configuration error: CLUSTER_WORKER_COUNT must be greater than 0");
        }
        if self.stream.read_count == 0 {
            anyhow::bail!("Configuration error: CLUSTER_READ_COUNT must be greater than 0");
        }
        if self.stream.stream_key == self.stream.dead_letter_stream {
            anyhow::bail!(
                "Configuration error: CLUSTER_STREAM_KEY and CLUSTER_DEAD_LETTER_STREAM must differ"
            );
        }

        Ok(())
    }
}

/// Build the final broker URL: splice credentials when the URL carries no
/// userinfo and upgrade the scheme when TLS is forced. Credentials already
/// present in the URL win over the dedicated variables.
fn build_redis_url(url: &str, username: Option<&str>, password: Option<&str>, ssl: bool) -> String {
    let mut url = url.to_string();

    if ssl && url.starts_with("redis://") {
        url = format!("rediss://{}", &url["redis://".len()..]);
    }

    let has_userinfo = url
        .find("://")
        .map(|i| url[i + 3..].contains('@'))
        .unwrap_or(false);

    if !has_userinfo && (username.is_some() || password.is_some()) {
        if let Some(scheme_end) = url.find("://") {
            let creds = format!(
                "{}:{}",
                username.unwrap_or_default(),
                password.unwrap_or_default()
            );
            url = format!("{}://{}@{}", &url[..scheme_end], creds, &url[scheme_end + 3..]);
        }
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli::default()
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("local"), Environment::Local);
        assert_eq!(Environment::parse("Production"), Environment::Production);
        assert_eq!(Environment::parse("prod"), Environment::Production);
        assert_eq!(Environment::parse("anything"), Environment::Development);
        assert!(Environment::Local.is_development());
        assert!(!Environment::Staging.is_development());
    }

    #[test]
    fn test_defaults_load() {
        let config = AppConfig::load(&base_cli()).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.stream.stream_key, "streams:media.cluster");
        assert_eq!(config.stream.consumer_group, "media-clustering-workers");
        assert_eq!(config.cache.ttl, Duration::from_secs(86400));
        assert_eq!(config.auth.internal_token, "changeme");
    }

    #[test]
    fn test_placeholder_token_refused_outside_development() {
        let mut cli = base_cli();
        cli.environment = Some("production".to_string());
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("INTERNAL_TOKEN"));

        cli.internal_token = Some("s3cret-token".to_string());
        assert!(AppConfig::load(&cli).is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut cli = base_cli();
        cli.cluster_ttl_seconds = Some(0);
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn test_stream_keys_must_differ() {
        let mut cli = base_cli();
        cli.cluster_stream_key = Some("s".to_string());
        cli.cluster_dead_letter_stream = Some("s".to_string());
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn test_build_redis_url_credentials() {
        assert_eq!(
            build_redis_url("redis://localhost:6379/0", Some("app"), Some("pw"), false),
            "redis://app:pw@localhost:6379/0"
        );
        // Credentials in the URL win
        assert_eq!(
            build_redis_url("redis://a:b@localhost:6379", Some("app"), Some("pw"), false),
            "redis://a:b@localhost:6379"
        );
        assert_eq!(
            build_redis_url("redis://localhost:6379", None, Some("pw"), false),
            "redis://:pw@localhost:6379"
        );
    }

    #[test]
    fn test_build_redis_url_ssl_upgrade() {
        assert_eq!(
            build_redis_url("redis://localhost:6379", None, None, true),
            "rediss://localhost:6379"
        );
        // Already TLS, unchanged
        assert_eq!(
            build_redis_url("rediss://localhost:6380", None, None, true),
            "rediss://localhost:6380"
        );
    }
}
