//! Job enqueue endpoint

use std::collections::BTreeMap;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ApiState;
use crate::api::types::ApiError;
use crate::domain::job::{ClusterJob, JobPayload};

#[derive(Debug, Deserialize)]
pub struct EnqueueJobRequest {
    pub pet_id: Option<String>,
    pub job_id: Option<String>,
    pub reason: Option<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub payload: JobPayload,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct EnqueueJobResponse {
    pub status: &'static str,
    pub job_id: String,
}

/// Validate the body, assign a job id when absent, and append to the stream.
/// Broker failure maps to 503; the entry is never dropped silently.
pub async fn enqueue_job(
    State(state): State<ApiState>,
    Json(body): Json<EnqueueJobRequest>,
) -> Result<(StatusCode, Json<EnqueueJobResponse>), ApiError> {
    let started = Instant::now();

    let pet_id = body
        .pet_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_PET_ID", "pet_id is required"))?
        .to_string();

    let job_id = body
        .job_id
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let job = ClusterJob {
        job_id: job_id.clone(),
        pet_id: pet_id.clone(),
        reason: body.reason,
        force: body.force,
        payload: body.payload.normalized(),
        metadata: body.metadata,
        attempts: 0,
        emitted_at: Some(Utc::now()),
    };

    let message_id = state
        .streams
        .enqueue(&job)
        .await
        .map_err(ApiError::from_stream)?;

    metrics::counter!("sploot_jobs_enqueued_total").increment(1);
    tracing::info!(
        pet_id = %pet_id,
        job_id = %job_id,
        msg_id = %message_id,
        force = job.force,
        images = job.payload.image_ids.len(),
        latency_ms = started.elapsed().as_millis() as u64,
        outcome = "accepted",
        "Cluster job enqueued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueJobResponse {
            status: "accepted",
            job_id,
        }),
    ))
}
