//! Redis stream backend using consumer groups
//!
//! - `XADD` for appends (with MAXLEN trimming)
//! - `XREADGROUP` for blocking group reads
//! - `XAUTOCLAIM` for claim-based retry of idle messages
//! - `XACK` for acknowledgment
//! - `XPENDING` / `XINFO GROUPS` for backpressure and health
//!
//! Every command runs under the configured socket deadline (extended by the
//! block window for reads) so a wedged broker surfaces as `Timeout`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{RedisResult, Value as RedisValue};

use super::backend::{CLAIM_START, StreamBackend, StreamEntry, StreamGroupInfo};
use super::error::StreamError;
use crate::data::redis::RedisPool;

pub struct RedisStreamBackend {
    pool: RedisPool,
    /// Per-command deadline
    op_timeout: Duration,
}

impl RedisStreamBackend {
    pub fn new(pool: RedisPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    async fn with_deadline<T>(
        &self,
        extra: Duration,
        fut: impl Future<Output = Result<T, StreamError>>,
    ) -> Result<T, StreamError> {
        let deadline = self.op_timeout + extra;
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| StreamError::Timeout(format!("deadline {deadline:?} exceeded")))?
    }
}

#[async_trait]
impl StreamBackend for RedisStreamBackend {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        self.with_deadline(Duration::ZERO, async {
            let mut conn = self.pool.get().await?;

            // Anchor at `$` so only new messages are delivered on first
            // startup; BUSYGROUP means the group already exists.
            let result: RedisResult<String> = deadpool_redis::redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(stream)
                .arg(group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => Ok(()),
                Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
                Err(e) => Err(StreamError::Group(format!(
                    "Failed to create consumer group {group}: {e}"
                ))),
            }
        })
        .await
    }

    async fn append(
        &self,
        stream: &str,
        fields: &[(String, String)],
        maxlen: u64,
        approximate: bool,
    ) -> Result<String, StreamError> {
        self.with_deadline(Duration::ZERO, async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| StreamError::Unavailable(e.to_string()))?;

            let mut cmd = deadpool_redis::redis::cmd("XADD");
            cmd.arg(stream);
            if maxlen > 0 {
                cmd.arg("MAXLEN");
                if approximate {
                    cmd.arg("~");
                }
                cmd.arg(maxlen);
            }
            cmd.arg("*");
            for (name, value) in fields {
                cmd.arg(name.as_str()).arg(value.as_str());
            }

            let id: String = cmd
                .query_async(&mut conn)
                .await
                .map_err(map_write_error)?;
            Ok(id)
        })
        .await
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
        self.with_deadline(Duration::from_millis(block_ms), async {
            let mut conn = self.pool.get().await?;

            let mut cmd = deadpool_redis::redis::cmd("XREADGROUP");
            cmd.arg("GROUP").arg(group).arg(consumer);
            if block_ms > 0 {
                cmd.arg("BLOCK").arg(block_ms);
            }
            cmd.arg("COUNT").arg(count).arg("STREAMS").arg(stream).arg(cursor);

            let value: RedisValue = cmd.query_async(&mut conn).await.map_err(map_group_error)?;

            match value {
                // Block timeout with no messages
                RedisValue::Nil => Ok(Vec::new()),
                value => Ok(parse_xreadgroup_reply(value)),
            }
        })
        .await
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
        self.with_deadline(Duration::ZERO, async {
            let mut conn = self.pool.get().await?;

            let value: RedisValue = deadpool_redis::redis::cmd("XAUTOCLAIM")
                .arg(stream)
                .arg(group)
                .arg(consumer)
                .arg(min_idle_ms)
                .arg(start_id)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await
                .map_err(map_group_error)?;

            // Reply: [next_cursor, [[id, fields], ...], (deleted ids)]
            let RedisValue::Array(mut parts) = value else {
                return Err(StreamError::Protocol("unexpected XAUTOCLAIM reply".into()));
            };
            if parts.len() < 2 {
                return Err(StreamError::Protocol("short XAUTOCLAIM reply".into()));
            }
            let entries_value = parts.swap_remove(1);
            let cursor_value = parts.swap_remove(0);

            let next_cursor =
                value_to_string(&cursor_value).unwrap_or_else(|| CLAIM_START.to_string());
            let entries = parse_entry_list(entries_value);

            Ok((entries, next_cursor))
        })
        .await
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        self.with_deadline(Duration::ZERO, async {
            let mut conn = self.pool.get().await?;
            let _: i64 = deadpool_redis::redis::cmd("XACK")
                .arg(stream)
                .arg(group)
                .arg(id)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn pending_count(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<u64, StreamError> {
        self.with_deadline(Duration::ZERO, async {
            let mut conn = self.pool.get().await?;

            // Summary form: [total, smallest_id, largest_id, [[consumer, count], ...]]
            let value: RedisValue = deadpool_redis::redis::cmd("XPENDING")
                .arg(stream)
                .arg(group)
                .query_async(&mut conn)
                .await
                .map_err(map_group_error)?;

            let RedisValue::Array(parts) = value else {
                return Ok(0);
            };
            let Some(RedisValue::Array(consumers)) = parts.get(3) else {
                return Ok(0);
            };

            for entry in consumers {
                if let RedisValue::Array(pair) = entry
                    && pair.len() >= 2
                    && value_to_string(&pair[0]).as_deref() == Some(consumer)
                {
                    return Ok(value_to_string(&pair[1])
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0));
                }
            }
            Ok(0)
        })
        .await
    }

    async fn group_info(&self, stream: &str, group: &str) -> Result<StreamGroupInfo, StreamError> {
        self.with_deadline(Duration::ZERO, async {
            let mut conn = self.pool.get().await?;

            let length: u64 = deadpool_redis::redis::cmd("XLEN")
                .arg(stream)
                .query_async(&mut conn)
                .await?;

            let value: RedisValue = deadpool_redis::redis::cmd("XINFO")
                .arg("GROUPS")
                .arg(stream)
                .query_async(&mut conn)
                .await
                .map_err(map_group_error)?;

            let RedisValue::Array(groups) = value else {
                return Err(StreamError::Protocol("unexpected XINFO GROUPS reply".into()));
            };

            for entry in groups {
                let pairs = value_to_pairs(entry);
                let name = pairs
                    .iter()
                    .find(|(k, _)| k == "name")
                    .and_then(|(_, v)| value_to_string(v));
                if name.as_deref() != Some(group) {
                    continue;
                }

                let lookup = |field: &str| -> u64 {
                    pairs
                        .iter()
                        .find(|(k, _)| k == field)
                        .and_then(|(_, v)| value_to_string(v))
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0)
                };

                return Ok(StreamGroupInfo {
                    length,
                    pending: lookup("pending"),
                    consumers: lookup("consumers"),
                });
            }

            Err(StreamError::Group(format!(
                "NOGROUP consumer group {group} not found on {stream}"
            )))
        })
        .await
    }

    async fn health_check(&self) -> Result<(), StreamError> {
        self.with_deadline(Duration::ZERO, async {
            let mut conn = self
                .pool
                .get()
                .await
                .map_err(|e| StreamError::Unavailable(e.to_string()))?;

            deadpool_redis::redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map_err(|e| StreamError::Unavailable(e.to_string()))?;

            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Append failures mean the broker rejected the entry; the caller must see
/// that, never a silent drop.
fn map_write_error(e: deadpool_redis::redis::RedisError) -> StreamError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        StreamError::Unavailable(e.to_string())
    } else {
        StreamError::Redis(e)
    }
}

fn map_group_error(e: deadpool_redis::redis::RedisError) -> StreamError {
    if e.to_string().contains("NOGROUP") {
        StreamError::Group(e.to_string())
    } else {
        StreamError::Redis(e)
    }
}

/// Parse `[[stream_name, [[id, fields], ...]], ...]`
fn parse_xreadgroup_reply(value: RedisValue) -> Vec<StreamEntry> {
    let streams = match value {
        RedisValue::Array(arr) => arr,
        RedisValue::Map(map) => return map
            .into_iter()
            .flat_map(|(_, entries)| parse_entry_list(entries))
            .collect(),
        _ => return Vec::new(),
    };

    let mut out = Vec::new();
    for stream_data in streams {
        let RedisValue::Array(mut parts) = stream_data else {
            continue;
        };
        if parts.len() < 2 {
            continue;
        }
        out.extend(parse_entry_list(parts.swap_remove(1)));
    }
    out
}

/// Parse `[[id, [field, value, ...]], ...]`
fn parse_entry_list(value: RedisValue) -> Vec<StreamEntry> {
    let RedisValue::Array(items) = value else {
        return Vec::new();
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let RedisValue::Array(mut parts) = item else {
            continue;
        };
        if parts.len() < 2 {
            continue;
        }
        let fields_value = parts.swap_remove(1);
        let id_value = parts.swap_remove(0);

        let Some(id) = value_to_string(&id_value) else {
            continue;
        };

        let mut fields = Vec::new();
        if let RedisValue::Array(raw) = fields_value {
            let mut iter = raw.into_iter();
            while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
                if let (Some(name), Some(value)) =
                    (value_to_string(&name), value_to_string(&value))
                {
                    fields.push((name, value));
                }
            }
        }

        entries.push(StreamEntry { id, fields });
    }
    entries
}

/// Flatten an XINFO-style `[k, v, k, v, ...]` array (or RESP3 map) into pairs
fn value_to_pairs(value: RedisValue) -> Vec<(String, RedisValue)> {
    match value {
        RedisValue::Array(raw) => {
            let mut pairs = Vec::new();
            let mut iter = raw.into_iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                if let Some(k) = value_to_string(&k) {
                    pairs.push((k, v));
                }
            }
            pairs
        }
        RedisValue::Map(map) => map
            .into_iter()
            .filter_map(|(k, v)| value_to_string(&k).map(|k| (k, v)))
            .collect(),
        _ => Vec::new(),
    }
}

fn value_to_string(value: &RedisValue) -> Option<String> {
    match value {
        RedisValue::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        RedisValue::SimpleString(s) => Some(s.clone()),
        RedisValue::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> RedisValue {
        RedisValue::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_xreadgroup_reply() {
        let reply = RedisValue::Array(vec![RedisValue::Array(vec![
            bulk("streams:media.cluster"),
            RedisValue::Array(vec![RedisValue::Array(vec![
                bulk("1-1"),
                RedisValue::Array(vec![bulk("pet_id"), bulk("p1"), bulk("attempts"), bulk("0")]),
            ])]),
        ])]);

        let entries = parse_xreadgroup_reply(reply);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "1-1");
        assert_eq!(entries[0].field("pet_id"), Some("p1"));
        assert_eq!(entries[0].field("attempts"), Some("0"));
    }

    #[test]
    fn test_parse_entry_list_skips_malformed() {
        let reply = RedisValue::Array(vec![
            RedisValue::Int(42),
            RedisValue::Array(vec![bulk("1-2"), RedisValue::Array(vec![bulk("k"), bulk("v")])]),
        ]);

        let entries = parse_entry_list(reply);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "1-2");
    }

    #[test]
    fn test_value_to_pairs_from_array() {
        let value = RedisValue::Array(vec![
            bulk("name"),
            bulk("media-clustering-workers"),
            bulk("pending"),
            RedisValue::Int(3),
        ]);
        let pairs = value_to_pairs(value);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "name");
        assert_eq!(value_to_string(&pairs[1].1).as_deref(), Some("3"));
    }
}
