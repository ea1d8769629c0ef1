//! Stream backend trait definition
//!
//! Thin wrapper over the broker's stream primitive: append, group-blocking
//! read, claim of idle messages, acknowledge, trim (via append maxlen) and
//! group creation. The Redis backend is the production binding; the memory
//! backend drives tests.

use async_trait::async_trait;

use super::error::StreamError;

/// Cursor selecting only never-delivered messages
pub const CURSOR_NEW: &str = ">";

/// Start id covering the whole pending entries list
pub const CLAIM_START: &str = "0-0";

/// One stream entry: broker-assigned id plus a flat string field map.
/// Nested structures (payload, metadata) travel as JSON strings in their
/// respective fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<(String, String)>,
}

impl StreamEntry {
    /// First value for the named field, if present
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Aggregate group statistics used by the broker-health probe
#[derive(Debug, Clone, Default)]
pub struct StreamGroupInfo {
    /// Total entries in the stream
    pub length: u64,
    /// Entries pending acknowledgment in the group
    pub pending: u64,
    /// Consumers known to the group
    pub consumers: u64,
}

/// Stream backend trait
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Idempotently create the stream (if absent) and the consumer group,
    /// anchored at `$` so only new messages are delivered on first startup.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError>;

    /// Append a field map; `maxlen > 0` trims with approximate or exact
    /// policy. Returns the broker-assigned message id.
    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        maxlen: u64,
        approximate: bool,
    ) -> Result<String, StreamError>;

    /// Blocking group read. `cursor = ">"` yields only never-delivered
    /// messages; `cursor = "0"` yields this consumer's still-pending backlog.
    /// A block timeout returns an empty vec, not an error.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
        cursor: &str,
    ) -> Result<Vec<StreamEntry>, StreamError>;

    /// Transfer messages idle longer than `min_idle_ms` to `consumer`,
    /// paginating from `start_id`. Returns the claimed entries and the next
    /// start id (`"0-0"` when the scan wrapped). A claim increments the
    /// broker's delivery counter and resets idle time.
    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        start_id: &str,
        count: usize,
    ) -> Result<(Vec<StreamEntry>, String), StreamError>;

    /// Acknowledge a message, removing it from the pending set
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError>;

    /// Messages held-but-unacked by the named consumer
    async fn pending_count(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<u64, StreamError>;

    /// Group statistics for the health probe
    async fn group_info(&self, stream: &str, group: &str) -> Result<StreamGroupInfo, StreamError>;

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), StreamError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
