//! Cluster worker loop
//!
//! Long-lived consumer over the job stream: blocking group reads, strategy
//! dispatch, cache write, acknowledge, and a periodic reclaim pass for
//! messages whose owner went silent. Owns retry accounting and dead-letter
//! routing.
//!
//! The put-then-ack ordering plus the deterministic strategy gives
//! at-least-once delivery with idempotent overwrite: a crash between the
//! cache write and the ack replays the job onto an identical descriptor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::constants::{CLAIM_PAGE_SIZE, FATAL_CONSECUTIVE_ERRORS, MAX_BACKOFF_SECS};
use crate::core::shutdown::ShutdownService;
use crate::data::cache::ClusterCache;
use crate::data::stream::{CLAIM_START, StreamEntry, StreamError, StreamService};
use crate::domain::job::{ClusterJob, entry_attempts};
use crate::domain::strategy::{ClusterStrategy, StrategyParams};

/// Dead-letter reason for undecodable messages
pub const REASON_DECODE: &str = "decode";

/// Dead-letter reason for messages that exhausted their retries
pub const REASON_MAX_ATTEMPTS: &str = "max_attempts";

/// Per-worker tuning, derived from configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique consumer name within the shared group
    pub consumer: String,
    pub read_count: usize,
    pub block_ms: u64,
    /// Cadence of the periodic reclaim pass
    pub claim_interval: Duration,
    /// Idle threshold before a pending message is reclaimed
    pub min_idle_ms: u64,
    /// Delivery attempts before dead-lettering
    pub max_attempts: u32,
    /// Held-but-unacked bound; above it the worker only reclaims
    pub max_pending: u64,
    /// Broker timeouts don't count toward the fatal error threshold
    pub retry_on_timeout: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ProcessOutcome {
    /// Descriptor written and message acked
    Processed,
    /// Message moved to the dead-letter stream and acked
    DeadLettered,
    /// Transient failure; message stays pending for the reclaim path
    Failed,
}

enum ErrorAction {
    Continue,
    Backoff(Duration),
    Fatal,
}

enum Tick {
    Shutdown,
    Claim,
    Polled(Result<Option<Vec<StreamEntry>>, StreamError>),
}

/// One consumer instance. Single-threaded internally; scale by running more
/// instances in the same group.
pub struct ClusterWorker {
    streams: Arc<StreamService>,
    cache: Arc<ClusterCache>,
    strategy: Arc<dyn ClusterStrategy>,
    params: StrategyParams,
    config: WorkerConfig,
}

impl ClusterWorker {
    pub fn new(
        streams: Arc<StreamService>,
        cache: Arc<ClusterCache>,
        strategy: Arc<dyn ClusterStrategy>,
        params: StrategyParams,
        config: WorkerConfig,
    ) -> Self {
        Self {
            streams,
            cache,
            strategy,
            params,
            config,
        }
    }

    /// Spawn the worker loop. A fatal broker state is reported through the
    /// shutdown service so the process can exit non-zero and be restarted.
    pub fn start(self, shutdown: ShutdownService) -> JoinHandle<()> {
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            self.run(shutdown, shutdown_rx).await;
        })
    }

    async fn run(self, shutdown: ShutdownService, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(
            consumer = %self.config.consumer,
            strategy = self.strategy.name(),
            "Cluster worker starting"
        );

        // The first claim pass happens one interval in, not at startup
        let mut claim_timer = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.claim_interval,
            self.config.claim_interval,
        );
        claim_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut consecutive_errors: u32 = 0;

        loop {
            // The select only picks the next tick; message processing and
            // error handling happen outside it, so shutdown never abandons
            // an in-flight batch half way.
            let tick = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => Tick::Shutdown,
                _ = claim_timer.tick() => Tick::Claim,
                polled = self.poll_new() => Tick::Polled(polled),
            };

            let result = match tick {
                Tick::Shutdown => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(consumer = %self.config.consumer, "Cluster worker draining");
                        break;
                    }
                    continue;
                }
                Tick::Claim => self.reclaim_pass().await,
                Tick::Polled(Ok(Some(batch))) => {
                    consecutive_errors = 0;
                    for entry in &batch {
                        self.process_entry(entry).await;
                    }
                    continue;
                }
                // Block timeout (or backpressure): reclaim instead
                Tick::Polled(Ok(None)) => self.reclaim_pass().await,
                Tick::Polled(Err(e)) => Err(e),
            };

            match result {
                Ok(()) => consecutive_errors = 0,
                Err(error) => match self.broker_error(&mut consecutive_errors, &error).await {
                    ErrorAction::Continue => {}
                    ErrorAction::Backoff(backoff) => {
                        tokio::select! {
                            _ = shutdown_rx.changed() => {}
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                    ErrorAction::Fatal => {
                        tracing::error!(
                            consumer = %self.config.consumer,
                            error = %error,
                            "Broker unreachable after retry exhaustion, failing worker"
                        );
                        shutdown.fail(format!("broker unreachable: {error}"));
                        return;
                    }
                },
            }
        }

        tracing::info!(consumer = %self.config.consumer, "Cluster worker stopped");
    }

    /// Read the next batch of never-delivered messages, honoring the
    /// backpressure bound. `Ok(None)` means "nothing to process this tick".
    async fn poll_new(&self) -> Result<Option<Vec<StreamEntry>>, StreamError> {
        let pending = self.streams.pending_count(&self.config.consumer).await?;
        if pending > self.config.max_pending {
            metrics::counter!("sploot_worker_backpressure_total").increment(1);
            tracing::debug!(
                consumer = %self.config.consumer,
                pending,
                max_pending = self.config.max_pending,
                "Backpressure: skipping new-message read"
            );
            return Ok(None);
        }

        let entries = self
            .streams
            .read_new(&self.config.consumer, self.config.read_count, self.config.block_ms)
            .await?;
        Ok((!entries.is_empty()).then_some(entries))
    }

    /// Classify a broker error into the loop's next action
    async fn broker_error(&self, consecutive_errors: &mut u32, error: &StreamError) -> ErrorAction {
        metrics::counter!("sploot_worker_broker_errors_total").increment(1);

        if self.config.retry_on_timeout && error.is_timeout() {
            tracing::debug!(consumer = %self.config.consumer, error = %error, "Broker timeout, retrying");
            return ErrorAction::Continue;
        }

        if error.is_missing_group() {
            tracing::warn!(consumer = %self.config.consumer, "Consumer group missing, recreating");
            if let Err(e) = self.streams.ensure_group().await {
                tracing::error!(error = %e, "Failed to recreate consumer group");
            }
            return ErrorAction::Continue;
        }

        *consecutive_errors += 1;
        if *consecutive_errors >= FATAL_CONSECUTIVE_ERRORS {
            return ErrorAction::Fatal;
        }

        let backoff =
            Duration::from_secs((1u64 << (*consecutive_errors).min(5)).min(MAX_BACKOFF_SECS));
        tracing::warn!(
            consumer = %self.config.consumer,
            error = %error,
            consecutive_errors = *consecutive_errors,
            backoff_secs = backoff.as_secs(),
            "Broker error, backing off"
        );
        ErrorAction::Backoff(backoff)
    }

    /// Process one freshly delivered message. Transient failures leave the
    /// message pending; the reclaim path owns the retry accounting.
    async fn process_entry(&self, entry: &StreamEntry) -> ProcessOutcome {
        let started = Instant::now();
        match ClusterJob::from_entry(entry) {
            Ok(job) => self.process_job(entry, &job, started).await,
            Err(error) => {
                self.dead_letter(entry, REASON_DECODE, entry_attempts(entry), Some(&error.to_string()))
                    .await
            }
        }
    }

    /// Strategy → cache put → ack, in that order
    async fn process_job(
        &self,
        entry: &StreamEntry,
        job: &ClusterJob,
        started: Instant,
    ) -> ProcessOutcome {
        let processed_at = Utc::now();

        let descriptor = match self.strategy.cluster(job, &self.params, processed_at) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                metrics::counter!("sploot_jobs_processed_total", "outcome" => "strategy_failed")
                    .increment(1);
                tracing::warn!(
                    pet_id = %job.pet_id,
                    job_id = %job.job_id,
                    error = %error,
                    outcome = "strategy_failed",
                    "Job processing failed"
                );
                return ProcessOutcome::Failed;
            }
        };

        if let Err(error) = self.cache.put_descriptor(&descriptor).await {
            metrics::counter!("sploot_jobs_processed_total", "outcome" => "cache_failed")
                .increment(1);
            tracing::warn!(
                pet_id = %job.pet_id,
                job_id = %job.job_id,
                error = %error,
                outcome = "cache_failed",
                "Cache write failed; message stays pending"
            );
            return ProcessOutcome::Failed;
        }

        if let Err(error) = self.streams.ack(&entry.id).await {
            // The descriptor is written; the replay after reclaim overwrites
            // it with identical content.
            tracing::warn!(
                pet_id = %job.pet_id,
                job_id = %job.job_id,
                msg_id = %entry.id,
                error = %error,
                "Ack failed after cache write"
            );
            return ProcessOutcome::Failed;
        }

        let latency = started.elapsed();
        metrics::counter!("sploot_jobs_processed_total", "outcome" => "processed").increment(1);
        metrics::histogram!("sploot_job_process_seconds").record(latency.as_secs_f64());
        tracing::info!(
            pet_id = %job.pet_id,
            job_id = %job.job_id,
            reason = job.reason.as_deref().unwrap_or(""),
            force = job.force,
            attempts = job.attempts,
            clusters = descriptor.clusters.len(),
            latency_ms = latency.as_millis() as u64,
            outcome = "processed",
            "Job processed"
        );
        ProcessOutcome::Processed
    }

    async fn dead_letter(
        &self,
        entry: &StreamEntry,
        reason: &str,
        attempts: u32,
        detail: Option<&str>,
    ) -> ProcessOutcome {
        match self.streams.dead_letter(entry, reason, attempts).await {
            Ok(()) => {
                metrics::counter!("sploot_jobs_dead_lettered_total", "reason" => reason.to_string())
                    .increment(1);
                tracing::warn!(
                    msg_id = %entry.id,
                    pet_id = entry.field("pet_id").unwrap_or(""),
                    job_id = entry.field("job_id").unwrap_or(""),
                    reason,
                    attempts,
                    detail = detail.unwrap_or(""),
                    outcome = "dead_lettered",
                    "Message dead-lettered"
                );
                ProcessOutcome::DeadLettered
            }
            Err(error) => {
                tracing::warn!(
                    msg_id = %entry.id,
                    error = %error,
                    "Dead-letter append failed; message stays pending"
                );
                ProcessOutcome::Failed
            }
        }
    }

    /// Claim messages whose owning consumer went silent and retry them,
    /// enforcing the attempts threshold. The bump is persisted by
    /// re-appending the job and acking the old id.
    async fn reclaim_pass(&self) -> Result<(), StreamError> {
        let mut cursor = CLAIM_START.to_string();

        loop {
            let (entries, next_cursor) = self
                .streams
                .claim_idle(
                    &self.config.consumer,
                    self.config.min_idle_ms,
                    &cursor,
                    CLAIM_PAGE_SIZE,
                )
                .await?;

            for entry in &entries {
                metrics::counter!("sploot_jobs_reclaimed_total").increment(1);

                let attempts = entry_attempts(entry);
                let bumped = attempts + 1;

                if bumped >= self.config.max_attempts {
                    self.dead_letter(entry, REASON_MAX_ATTEMPTS, bumped, None).await;
                    continue;
                }

                match ClusterJob::from_entry(entry) {
                    Err(error) => {
                        self.dead_letter(entry, REASON_DECODE, bumped, Some(&error.to_string()))
                            .await;
                    }
                    Ok(job) => {
                        let outcome = self.process_job(entry, &job, Instant::now()).await;
                        if outcome == ProcessOutcome::Failed {
                            if let Err(error) =
                                self.streams.requeue(&job, &entry.id, bumped).await
                            {
                                tracing::warn!(
                                    msg_id = %entry.id,
                                    error = %error,
                                    "Requeue failed; message stays pending with original attempts"
                                );
                            }
                        }
                    }
                }
            }

            if next_cursor == CLAIM_START {
                return Ok(());
            }
            cursor = next_cursor;
        }
    }
}
