//! Job stream access
//!
//! Wraps the stream backend with the configured stream/group names and the
//! dead-letter protocol: exhausted or undecodable messages are copied to the
//! dead-letter stream with a reason and attempts count, then acknowledged on
//! the main stream.

mod backend;
mod error;
mod memory;
mod redis;

use std::sync::Arc;

use chrono::Utc;

pub use backend::{CLAIM_START, CURSOR_NEW, StreamBackend, StreamEntry, StreamGroupInfo};
pub use error::StreamError;
pub use memory::MemoryStreamBackend;
pub use redis::RedisStreamBackend;

use crate::domain::job::{ClusterJob, FIELD_ATTEMPTS};

/// Field added to dead-letter entries naming why the message landed there
pub const FIELD_DEAD_LETTER_REASON: &str = "reason";

/// Field recording when the message was dead-lettered
pub const FIELD_DEAD_LETTER_FAILED_AT: &str = "failed_at";

/// Stream naming and trim policy
#[derive(Debug, Clone)]
pub struct StreamTopology {
    pub stream: String,
    pub group: String,
    pub dead_letter_stream: String,
    /// 0 disables trimming
    pub maxlen: u64,
    pub approximate_trim: bool,
}

/// Job stream service shared by the HTTP surface and the worker fleet
pub struct StreamService {
    backend: Arc<dyn StreamBackend>,
    topology: StreamTopology,
}

impl StreamService {
    pub fn new(backend: Arc<dyn StreamBackend>, topology: StreamTopology) -> Self {
        Self { backend, topology }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Idempotently create the stream and consumer group
    pub async fn ensure_group(&self) -> Result<(), StreamError> {
        self.backend
            .ensure_group(&self.topology.stream, &self.topology.group)
            .await
    }

    /// Append a job to the main stream; returns the broker message id
    pub async fn enqueue(&self, job: &ClusterJob) -> Result<String, StreamError> {
        self.backend
            .append(
                &self.topology.stream,
                &job.to_fields(),
                self.topology.maxlen,
                self.topology.approximate_trim,
            )
            .await
    }

    /// Blocking read of never-delivered messages for this consumer
    pub async fn read_new(
        &self,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        self.backend
            .read_group(
                &self.topology.stream,
                &self.topology.group,
                consumer,
                count,
                block_ms,
                CURSOR_NEW,
            )
            .await
    }

    /// Claim messages idle longer than `min_idle_ms`, paginating from
    /// `start_id`
    pub async fn claim_idle(
        &self,
        consumer: &str,
        min_idle_ms: u64,
        start_id: &str,
        count: usize,
    ) -> Result<(Vec<StreamEntry>, String), StreamError> {
        self.backend
            .claim_idle(
                &self.topology.stream,
                &self.topology.group,
                consumer,
                min_idle_ms,
                start_id,
                count,
            )
            .await
    }

    /// Acknowledge a processed message
    pub async fn ack(&self, id: &str) -> Result<(), StreamError> {
        self.backend
            .ack(&self.topology.stream, &self.topology.group, id)
            .await
    }

    /// Copy a message to the dead-letter stream with a reason and attempts
    /// count, then acknowledge the original. The dead-letter stream is never
    /// trimmed here; it exists for offline inspection.
    pub async fn dead_letter(
        &self,
        entry: &StreamEntry,
        reason: &str,
        attempts: u32,
    ) -> Result<(), StreamError> {
        let mut fields: Vec<(String, String)> = entry
            .fields
            .iter()
            .filter(|(name, _)| name != FIELD_ATTEMPTS)
            .cloned()
            .collect();
        fields.push((FIELD_ATTEMPTS.to_string(), attempts.to_string()));
        fields.push((FIELD_DEAD_LETTER_REASON.to_string(), reason.to_string()));
        fields.push((
            FIELD_DEAD_LETTER_FAILED_AT.to_string(),
            Utc::now().to_rfc3339(),
        ));

        self.backend
            .append(&self.topology.dead_letter_stream, &fields, 0, false)
            .await?;
        self.ack(&entry.id).await
    }

    /// Re-append a job with a bumped attempts counter and acknowledge the
    /// old message id. This is how reclaim persists the attempt count.
    pub async fn requeue(
        &self,
        job: &ClusterJob,
        old_id: &str,
        attempts: u32,
    ) -> Result<String, StreamError> {
        let mut retry = job.clone();
        retry.attempts = attempts;
        let id = self.enqueue(&retry).await?;
        self.ack(old_id).await?;
        Ok(id)
    }

    /// Messages held-but-unacked by the named consumer
    pub async fn pending_count(&self, consumer: &str) -> Result<u64, StreamError> {
        self.backend
            .pending_count(&self.topology.stream, &self.topology.group, consumer)
            .await
    }

    /// Group statistics for the health probe
    pub async fn group_info(&self) -> Result<StreamGroupInfo, StreamError> {
        self.backend
            .group_info(&self.topology.stream, &self.topology.group)
            .await
    }

    /// Broker liveness
    pub async fn health_check(&self) -> Result<(), StreamError> {
        self.backend.health_check().await
    }
}
