//! Clustering jobs and their stream wire format
//!
//! Stream entries are flat string-to-string maps; the nested payload and
//! metadata are serialized as JSON strings in their fields. Decode failures
//! are a distinct error kind: the worker dead-letters them instead of
//! retrying.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::stream::StreamEntry;

pub const FIELD_JOB_ID: &str = "job_id";
pub const FIELD_PET_ID: &str = "pet_id";
pub const FIELD_REASON: &str = "reason";
pub const FIELD_FORCE: &str = "force";
pub const FIELD_PAYLOAD: &str = "payload";
pub const FIELD_METADATA: &str = "metadata";
pub const FIELD_ATTEMPTS: &str = "attempts";
pub const FIELD_EMITTED_AT: &str = "emitted_at";

#[derive(Error, Debug)]
pub enum JobDecodeError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid `{field}`: {message}")]
    InvalidField { field: &'static str, message: String },
}

/// Images and grouping hints carried by one job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub image_ids: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Label-name to [0, 1] weight; unknown labels are permitted but ignored
    /// by scoring
    #[serde(default)]
    pub coverage: BTreeMap<String, f64>,
    #[serde(default)]
    pub quality_score: f64,
}

impl JobPayload {
    /// Enforce the payload invariants: image tokens and labels appear at
    /// most once (first occurrence wins), quality stays in [0, 1].
    pub fn normalized(&self) -> JobPayload {
        let mut seen_images = std::collections::HashSet::new();
        let image_ids = self
            .image_ids
            .iter()
            .filter(|id| seen_images.insert(id.as_str()))
            .cloned()
            .collect();

        let mut seen_labels = std::collections::HashSet::new();
        let labels = self
            .labels
            .iter()
            .filter(|label| seen_labels.insert(label.as_str()))
            .cloned()
            .collect();

        JobPayload {
            image_ids,
            labels,
            coverage: self.coverage.clone(),
            quality_score: self.quality_score.clamp(0.0, 1.0),
        }
    }
}

/// A unit of work naming a pet and its source images
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterJob {
    /// Opaque token, unique per enqueue
    pub job_id: String,
    pub pet_id: String,
    /// Free-form tag describing why the job was emitted
    pub reason: Option<String>,
    /// Bypasses "no change" short-circuits; advisory for descriptor content
    pub force: bool,
    pub payload: JobPayload,
    /// Trace context and producer id
    pub metadata: BTreeMap<String, String>,
    /// Delivery attempts so far; 0 on first append
    pub attempts: u32,
    pub emitted_at: Option<DateTime<Utc>>,
}

impl ClusterJob {
    pub fn new(job_id: impl Into<String>, pet_id: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            job_id: job_id.into(),
            pet_id: pet_id.into(),
            reason: None,
            force: false,
            payload,
            metadata: BTreeMap::new(),
            attempts: 0,
            emitted_at: None,
        }
    }

    /// Encode into the flat field map appended to the stream
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            (FIELD_JOB_ID.to_string(), self.job_id.clone()),
            (FIELD_PET_ID.to_string(), self.pet_id.clone()),
            (FIELD_FORCE.to_string(), self.force.to_string()),
            (
                FIELD_PAYLOAD.to_string(),
                serde_json::to_string(&self.payload).unwrap_or_else(|_| "{}".to_string()),
            ),
            (
                FIELD_METADATA.to_string(),
                serde_json::to_string(&self.metadata).unwrap_or_else(|_| "{}".to_string()),
            ),
            (FIELD_ATTEMPTS.to_string(), self.attempts.to_string()),
        ];
        if let Some(reason) = &self.reason {
            fields.push((FIELD_REASON.to_string(), reason.clone()));
        }
        if let Some(emitted_at) = &self.emitted_at {
            fields.push((FIELD_EMITTED_AT.to_string(), emitted_at.to_rfc3339()));
        }
        fields
    }

    /// Decode from a stream entry's field map. `pet_id` is required; the
    /// payload normalizes on decode so downstream code sees the invariants
    /// already enforced.
    pub fn from_entry(entry: &StreamEntry) -> Result<Self, JobDecodeError> {
        let pet_id = entry
            .field(FIELD_PET_ID)
            .filter(|v| !v.is_empty())
            .ok_or(JobDecodeError::MissingField(FIELD_PET_ID))?
            .to_string();

        let job_id = entry
            .field(FIELD_JOB_ID)
            .filter(|v| !v.is_empty())
            .ok_or(JobDecodeError::MissingField(FIELD_JOB_ID))?
            .to_string();

        let payload: JobPayload = match entry.field(FIELD_PAYLOAD) {
            None | Some("") => JobPayload::default(),
            Some(raw) => serde_json::from_str(raw).map_err(|e| JobDecodeError::InvalidField {
                field: FIELD_PAYLOAD,
                message: e.to_string(),
            })?,
        };

        let metadata: BTreeMap<String, String> = match entry.field(FIELD_METADATA) {
            None | Some("") => BTreeMap::new(),
            Some(raw) => serde_json::from_str(raw).map_err(|e| JobDecodeError::InvalidField {
                field: FIELD_METADATA,
                message: e.to_string(),
            })?,
        };

        let attempts = match entry.field(FIELD_ATTEMPTS) {
            None | Some("") => 0,
            Some(raw) => raw.parse().map_err(|_| JobDecodeError::InvalidField {
                field: FIELD_ATTEMPTS,
                message: format!("not an unsigned integer: {raw}"),
            })?,
        };

        let force = entry
            .field(FIELD_FORCE)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let emitted_at = entry
            .field(FIELD_EMITTED_AT)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Self {
            job_id,
            pet_id,
            reason: entry.field(FIELD_REASON).map(|s| s.to_string()),
            force,
            payload: payload.normalized(),
            metadata,
            attempts,
            emitted_at,
        })
    }
}

/// Attempts recorded on a raw entry, used before (or instead of) a full
/// decode on the reclaim and dead-letter paths.
pub fn entry_attempts(entry: &StreamEntry) -> u32 {
    entry
        .field(FIELD_ATTEMPTS)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_from(job: &ClusterJob) -> StreamEntry {
        StreamEntry {
            id: "0-1".to_string(),
            fields: job.to_fields(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let mut job = ClusterJob::new(
            "job-1",
            "p1",
            JobPayload {
                image_ids: vec!["a".into(), "b".into()],
                labels: vec!["L".into()],
                coverage: BTreeMap::from([("L".to_string(), 0.7)]),
                quality_score: 0.9,
            },
        );
        job.reason = Some("new-upload".to_string());
        job.force = true;
        job.metadata.insert("producer".into(), "media-api".into());
        job.emitted_at = Some(Utc::now());

        let decoded = ClusterJob::from_entry(&entry_from(&job)).unwrap();
        assert_eq!(decoded.job_id, "job-1");
        assert_eq!(decoded.pet_id, "p1");
        assert_eq!(decoded.reason.as_deref(), Some("new-upload"));
        assert!(decoded.force);
        assert_eq!(decoded.payload, job.payload);
        assert_eq!(decoded.metadata, job.metadata);
        assert_eq!(decoded.attempts, 0);
        assert!(decoded.emitted_at.is_some());
    }

    #[test]
    fn test_missing_pet_id_is_decode_error() {
        let entry = StreamEntry {
            id: "0-1".to_string(),
            fields: vec![(FIELD_JOB_ID.to_string(), "job-1".to_string())],
        };
        assert!(matches!(
            ClusterJob::from_entry(&entry),
            Err(JobDecodeError::MissingField(FIELD_PET_ID))
        ));
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let entry = StreamEntry {
            id: "0-1".to_string(),
            fields: vec![
                (FIELD_JOB_ID.to_string(), "job-1".to_string()),
                (FIELD_PET_ID.to_string(), "p1".to_string()),
                (FIELD_PAYLOAD.to_string(), "not json".to_string()),
            ],
        };
        assert!(matches!(
            ClusterJob::from_entry(&entry),
            Err(JobDecodeError::InvalidField { field: FIELD_PAYLOAD, .. })
        ));
    }

    #[test]
    fn test_empty_payload_normalizes_to_default() {
        let entry = StreamEntry {
            id: "0-1".to_string(),
            fields: vec![
                (FIELD_JOB_ID.to_string(), "job-1".to_string()),
                (FIELD_PET_ID.to_string(), "p1".to_string()),
            ],
        };
        let job = ClusterJob::from_entry(&entry).unwrap();
        assert_eq!(job.payload, JobPayload::default());
        assert_eq!(job.attempts, 0);
        assert!(!job.force);
    }

    #[test]
    fn test_payload_normalization() {
        let payload = JobPayload {
            image_ids: vec!["a".into(), "b".into(), "a".into()],
            labels: vec!["x".into(), "x".into(), "y".into()],
            coverage: BTreeMap::new(),
            quality_score: 1.7,
        };
        let normalized = payload.normalized();
        assert_eq!(normalized.image_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(normalized.labels, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(normalized.quality_score, 1.0);
    }

    #[test]
    fn test_entry_attempts_defaults_to_zero() {
        let entry = StreamEntry {
            id: "0-1".to_string(),
            fields: vec![],
        };
        assert_eq!(entry_attempts(&entry), 0);

        let entry = StreamEntry {
            id: "0-1".to_string(),
            fields: vec![(FIELD_ATTEMPTS.to_string(), "2".to_string())],
        };
        assert_eq!(entry_attempts(&entry), 2);
    }
}
