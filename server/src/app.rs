//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::api::server::{ApiServer, start_metrics_server};
use crate::core::cli::{self, Cli};
use crate::core::config::{AppConfig, Environment};
use crate::core::constants::{CLAIM_INTERVAL_SECS, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::cache::{ClusterCache, RedisCache};
use crate::data::redis::connect_pool;
use crate::data::stream::{RedisStreamBackend, StreamService, StreamTopology};
use crate::domain::strategy::{HeuristicStrategy, StrategyParams};
use crate::domain::worker::{ClusterWorker, WorkerConfig};

pub struct CoreApp {
    pub config: AppConfig,
    pub shutdown: ShutdownService,
    pub streams: Arc<StreamService>,
    pub cache: Arc<ClusterCache>,
}

impl CoreApp {
    /// Entry point: configuration, services, workers, HTTP
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let cli = cli::parse();
        Self::init_logging(&cli);

        let config = AppConfig::load(&cli)?;
        let app = Self::init(config).await?;
        app.start().await
    }

    fn init_logging(cli: &Cli) {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let environment = cli
            .environment
            .as_deref()
            .map(Environment::parse)
            .unwrap_or_default();

        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_env_filter(filter);

        // Console-friendly locally, structured JSON for log shippers
        if environment.is_development() {
            builder.compact().init();
        } else {
            builder.json().init();
        }
    }

    async fn init(config: AppConfig) -> Result<Self> {
        let pool = connect_pool(&config.redis).await?;

        let cache = Arc::new(ClusterCache::new(
            Arc::new(RedisCache::new(pool.clone(), config.redis.socket_timeout)),
            config.cache.namespace.clone(),
            config.cache.ttl,
        ));
        tracing::debug!(backend = cache.backend_name(), "Cache initialized");

        let streams = Arc::new(StreamService::new(
            Arc::new(RedisStreamBackend::new(pool, config.redis.socket_timeout)),
            StreamTopology {
                stream: config.stream.stream_key.clone(),
                group: config.stream.consumer_group.clone(),
                dead_letter_stream: config.stream.dead_letter_stream.clone(),
                maxlen: config.stream.maxlen,
                approximate_trim: config.stream.approximate_trim,
            },
        ));
        tracing::debug!(backend = streams.backend_name(), "Stream client initialized");

        Ok(Self {
            config,
            shutdown: ShutdownService::new(),
            streams,
            cache,
        })
    }

    async fn start(self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        self.shutdown.install_signal_handlers();

        self.streams
            .ensure_group()
            .await
            .context("Failed to create consumer group")?;

        self.start_workers();

        if self.config.metrics.enabled {
            start_metrics_server(&self.config, &self.shutdown).await?;
        }

        tracing::info!(
            app = %self.config.app_name,
            environment = %self.config.environment,
            version = env!("CARGO_PKG_VERSION"),
            "Startup complete"
        );

        let server = ApiServer::new(&self.config, self.streams.clone(), self.cache.clone());
        server.start(&self.shutdown).await?;

        // HTTP is down; drain the worker fleet before the pool drops
        self.shutdown.shutdown().await;

        if let Some(reason) = self.shutdown.failure() {
            anyhow::bail!("Fatal: {reason}");
        }
        Ok(())
    }

    fn start_workers(&self) {
        let stream = &self.config.stream;
        let base = stream
            .consumer_name_base
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let params = StrategyParams {
            max_cluster_size: self.config.cache.max_cluster_size,
        };

        for index in 0..stream.worker_count {
            // Unique consumer name within the shared group: {base}:{pid}:{index}
            let consumer = format!("{base}:{}:{index}", std::process::id());
            let worker = ClusterWorker::new(
                self.streams.clone(),
                self.cache.clone(),
                Arc::new(HeuristicStrategy),
                params.clone(),
                WorkerConfig {
                    consumer,
                    read_count: stream.read_count,
                    block_ms: stream.read_timeout_ms,
                    claim_interval: Duration::from_secs(CLAIM_INTERVAL_SECS),
                    min_idle_ms: stream.retry_idle_ms,
                    max_attempts: stream.max_attempts,
                    max_pending: stream.max_pending_per_worker,
                    retry_on_timeout: self.config.redis.retry_on_timeout,
                },
            );
            self.shutdown.register(worker.start(self.shutdown.clone()));
        }

        tracing::debug!(workers = stream.worker_count, "Worker fleet started");
    }
}
