//! In-memory stream backend
//!
//! Mirrors the broker semantics the workers rely on (group cursor, pending
//! entries list, idle-based claims with delivery counters, trim) without a
//! running Redis. Drives the worker and API tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::{CLAIM_START, CURSOR_NEW, StreamBackend, StreamEntry, StreamGroupInfo};
use super::error::StreamError;

/// Poll interval while emulating a blocking read
const BLOCK_POLL: Duration = Duration::from_millis(5);

struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Default)]
struct GroupState {
    /// Next sequence number this group will deliver
    next_seq: u64,
    pending: HashMap<u64, PendingEntry>,
}

#[derive(Default)]
struct StreamState {
    entries: Vec<(u64, Vec<(String, String)>)>,
    groups: HashMap<String, GroupState>,
}

#[derive(Default)]
pub struct MemoryStreamBackend {
    state: Mutex<HashMap<String, StreamState>>,
    seq: AtomicU64,
}

impl MemoryStreamBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries in a stream, oldest first (test inspection)
    pub fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        let state = self.state.lock();
        state
            .get(stream)
            .map(|s| {
                s.entries
                    .iter()
                    .map(|(seq, fields)| StreamEntry {
                        id: format_id(*seq),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn format_id(seq: u64) -> String {
    format!("0-{seq}")
}

fn parse_seq(id: &str) -> u64 {
    id.rsplit('-')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl StreamBackend for MemoryStreamBackend {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut state = self.state.lock();
        let stream_state = state.entry(stream.to_string()).or_default();
        let anchor = stream_state
            .entries
            .last()
            .map(|(seq, _)| seq + 1)
            .unwrap_or(1);
        stream_state
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                next_seq: anchor,
                pending: HashMap::new(),
            });
        Ok(())
    }

    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        maxlen: u64,
        _approximate: bool,
    ) -> Result<String, StreamError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        let stream_state = state.entry(stream.to_string()).or_default();
        stream_state.entries.push((seq, fields.to_vec()));

        if maxlen > 0 && stream_state.entries.len() as u64 > maxlen {
            let excess = stream_state.entries.len() - maxlen as usize;
            stream_state.entries.drain(..excess);
        }

        Ok(format_id(seq))
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
        cursor: &str,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let deadline = Instant::now() + Duration::from_millis(block_ms);

        loop {
            {
                let mut state = self.state.lock();
                let stream_state = state
                    .get_mut(stream)
                    .ok_or_else(|| StreamError::Group(format!("NOGROUP no stream {stream}")))?;
                let StreamState { entries, groups } = stream_state;
                let group_state = groups
                    .get_mut(group)
                    .ok_or_else(|| StreamError::Group(format!("NOGROUP no group {group}")))?;

                if cursor == CURSOR_NEW {
                    let next_seq = group_state.next_seq;
                    let fresh: Vec<(u64, Vec<(String, String)>)> = entries
                        .iter()
                        .filter(|(seq, _)| *seq >= next_seq)
                        .take(count)
                        .cloned()
                        .collect();

                    if !fresh.is_empty() {
                        let now = Instant::now();
                        let mut out = Vec::with_capacity(fresh.len());
                        for (seq, fields) in fresh {
                            group_state.pending.insert(
                                seq,
                                PendingEntry {
                                    consumer: consumer.to_string(),
                                    delivered_at: now,
                                    delivery_count: 1,
                                },
                            );
                            group_state.next_seq = seq + 1;
                            out.push(StreamEntry {
                                id: format_id(seq),
                                fields,
                            });
                        }
                        return Ok(out);
                    }
                } else {
                    // Own pending backlog; no delivery bookkeeping
                    let start = parse_seq(cursor);
                    let mut seqs: Vec<u64> = group_state
                        .pending
                        .iter()
                        .filter(|(seq, p)| p.consumer == consumer && **seq >= start)
                        .map(|(seq, _)| *seq)
                        .collect();
                    seqs.sort_unstable();
                    seqs.truncate(count);

                    let out: Vec<StreamEntry> = seqs
                        .into_iter()
                        .filter_map(|seq| {
                            entries
                                .iter()
                                .find(|(s, _)| *s == seq)
                                .map(|(_, fields)| StreamEntry {
                                    id: format_id(seq),
                                    fields: fields.clone(),
                                })
                        })
                        .collect();
                    return Ok(out);
                }
            }

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(BLOCK_POLL).await;
        }
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        start_id: &str,
        count: usize,
    ) -> Result<(Vec<StreamEntry>, String), StreamError> {
        let min_idle = Duration::from_millis(min_idle_ms);
        let start = parse_seq(start_id);
        let now = Instant::now();

        let mut state = self.state.lock();
        let stream_state = state
            .get_mut(stream)
            .ok_or_else(|| StreamError::Group(format!("NOGROUP no stream {stream}")))?;
        let StreamState { entries, groups } = stream_state;
        let group_state = groups
            .get_mut(group)
            .ok_or_else(|| StreamError::Group(format!("NOGROUP no group {group}")))?;

        let mut idle_seqs: Vec<u64> = group_state
            .pending
            .iter()
            .filter(|(seq, p)| **seq >= start && now.duration_since(p.delivered_at) >= min_idle)
            .map(|(seq, _)| *seq)
            .collect();
        idle_seqs.sort_unstable();

        let remainder = idle_seqs.split_off(idle_seqs.len().min(count));
        let next_cursor = remainder
            .first()
            .map(|seq| format_id(*seq))
            .unwrap_or_else(|| CLAIM_START.to_string());

        let mut claimed = Vec::new();
        for seq in idle_seqs {
            match entries.iter().find(|(s, _)| *s == seq) {
                Some((_, fields)) => {
                    if let Some(pending) = group_state.pending.get_mut(&seq) {
                        pending.consumer = consumer.to_string();
                        pending.delivered_at = now;
                        pending.delivery_count += 1;
                    }
                    claimed.push(StreamEntry {
                        id: format_id(seq),
                        fields: fields.clone(),
                    });
                }
                None => {
                    // Trimmed away; drop the dangling pending entry
                    group_state.pending.remove(&seq);
                }
            }
        }

        Ok((claimed, next_cursor))
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let seq = parse_seq(id);
        let mut state = self.state.lock();
        if let Some(stream_state) = state.get_mut(stream)
            && let Some(group_state) = stream_state.groups.get_mut(group)
        {
            group_state.pending.remove(&seq);
        }
        Ok(())
    }

    async fn pending_count(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<u64, StreamError> {
        let state = self.state.lock();
        Ok(state
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| {
                g.pending
                    .values()
                    .filter(|p| p.consumer == consumer)
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn group_info(&self, stream: &str, group: &str) -> Result<StreamGroupInfo, StreamError> {
        let state = self.state.lock();
        let stream_state = state
            .get(stream)
            .ok_or_else(|| StreamError::Group(format!("NOGROUP no stream {stream}")))?;
        let group_state = stream_state
            .groups
            .get(group)
            .ok_or_else(|| StreamError::Group(format!("NOGROUP no group {group}")))?;

        let consumers: std::collections::HashSet<&str> = group_state
            .pending
            .values()
            .map(|p| p.consumer.as_str())
            .collect();

        Ok(StreamGroupInfo {
            length: stream_state.entries.len() as u64,
            pending: group_state.pending.len() as u64,
            consumers: consumers.len() as u64,
        })
    }

    async fn health_check(&self) -> Result<(), StreamError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_group_anchored_at_stream_end() {
        let backend = MemoryStreamBackend::new();
        backend
            .append("s", &fields(&[("k", "old")]), 0, true)
            .await
            .unwrap();
        backend.ensure_group("s", "g").await.unwrap();
        backend
            .append("s", &fields(&[("k", "new")]), 0, true)
            .await
            .unwrap();

        let read = backend.read_group("s", "g", "c1", 10, 0, CURSOR_NEW).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].field("k"), Some("new"));
    }

    #[tokio::test]
    async fn test_ensure_group_idempotent() {
        let backend = MemoryStreamBackend::new();
        backend.ensure_group("s", "g").await.unwrap();
        backend
            .append("s", &fields(&[("k", "v")]), 0, true)
            .await
            .unwrap();
        // Second ensure must not move the cursor
        backend.ensure_group("s", "g").await.unwrap();

        let read = backend.read_group("s", "g", "c1", 10, 0, CURSOR_NEW).await.unwrap();
        assert_eq!(read.len(), 1);
    }

    #[tokio::test]
    async fn test_read_marks_pending_until_ack() {
        let backend = MemoryStreamBackend::new();
        backend.ensure_group("s", "g").await.unwrap();
        backend
            .append("s", &fields(&[("k", "v")]), 0, true)
            .await
            .unwrap();

        let read = backend.read_group("s", "g", "c1", 10, 0, CURSOR_NEW).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(backend.pending_count("s", "g", "c1").await.unwrap(), 1);

        // Not redelivered to the new-message cursor
        let again = backend.read_group("s", "g", "c1", 10, 0, CURSOR_NEW).await.unwrap();
        assert!(again.is_empty());

        // But visible in the consumer's own backlog
        let backlog = backend.read_group("s", "g", "c1", 10, 0, "0").await.unwrap();
        assert_eq!(backlog.len(), 1);

        backend.ack("s", "g", &read[0].id).await.unwrap();
        assert_eq!(backend.pending_count("s", "g", "c1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_block_timeout_returns_empty() {
        let backend = MemoryStreamBackend::new();
        backend.ensure_group("s", "g").await.unwrap();

        let read = backend
            .read_group("s", "g", "c1", 10, 20, CURSOR_NEW)
            .await
            .unwrap();
        assert!(read.is_empty());
    }

    #[tokio::test]
    async fn test_claim_transfers_idle_messages() {
        let backend = MemoryStreamBackend::new();
        backend.ensure_group("s", "g").await.unwrap();
        backend
            .append("s", &fields(&[("k", "v")]), 0, true)
            .await
            .unwrap();

        let read = backend.read_group("s", "g", "c1", 10, 0, CURSOR_NEW).await.unwrap();
        assert_eq!(read.len(), 1);

        // Not idle yet
        let (claimed, cursor) = backend
            .claim_idle("s", "g", "c2", 60_000, CLAIM_START, 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());
        assert_eq!(cursor, CLAIM_START);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let (claimed, _) = backend
            .claim_idle("s", "g", "c2", 10, CLAIM_START, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(backend.pending_count("s", "g", "c1").await.unwrap(), 0);
        assert_eq!(backend.pending_count("s", "g", "c2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claim_paginates() {
        let backend = MemoryStreamBackend::new();
        backend.ensure_group("s", "g").await.unwrap();
        for i in 0..3 {
            backend
                .append("s", &fields(&[("i", &i.to_string())]), 0, true)
                .await
                .unwrap();
        }
        backend.read_group("s", "g", "c1", 10, 0, CURSOR_NEW).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (first, cursor) = backend
            .claim_idle("s", "g", "c2", 10, CLAIM_START, 2)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_ne!(cursor, CLAIM_START);

        let (rest, cursor) = backend
            .claim_idle("s", "g", "c2", 0, &cursor, 2)
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(cursor, CLAIM_START);
    }

    #[tokio::test]
    async fn test_maxlen_trims_oldest() {
        let backend = MemoryStreamBackend::new();
        for i in 0..5 {
            backend
                .append("s", &fields(&[("i", &i.to_string())]), 3, true)
                .await
                .unwrap();
        }
        let entries = backend.entries("s");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].field("i"), Some("2"));
    }

    #[tokio::test]
    async fn test_group_info() {
        let backend = MemoryStreamBackend::new();
        backend.ensure_group("s", "g").await.unwrap();
        backend
            .append("s", &fields(&[("k", "v")]), 0, true)
            .await
            .unwrap();
        backend.read_group("s", "g", "c1", 10, 0, CURSOR_NEW).await.unwrap();

        let info = backend.group_info("s", "g").await.unwrap();
        assert_eq!(info.length, 1);
        assert_eq!(info.pending, 1);
        assert_eq!(info.consumers, 1);
    }
}
