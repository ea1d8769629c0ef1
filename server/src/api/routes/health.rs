//! Liveness and broker health endpoints

use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::api::ApiState;
use crate::api::types::ApiError;
use crate::core::constants::HEALTH_PROBE_TIMEOUT_MS;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness only: `ok` whenever the process is running
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

#[derive(Serialize)]
pub struct BrokerHealthResponse {
    pub status: &'static str,
    pub stream_length: u64,
    pub pending: u64,
    pub consumers: u64,
}

/// Probe the broker with a low-timeout ping plus group introspection on the
/// configured stream; 503 when either fails.
pub async fn redis_health(
    State(state): State<ApiState>,
) -> Result<Json<BrokerHealthResponse>, ApiError> {
    let started = Instant::now();
    let probe_timeout = Duration::from_millis(HEALTH_PROBE_TIMEOUT_MS);

    tokio::time::timeout(probe_timeout, state.streams.health_check())
        .await
        .map_err(|_| ApiError::service_unavailable("broker ping timed out"))?
        .map_err(ApiError::from_stream)?;

    let info = tokio::time::timeout(probe_timeout, state.streams.group_info())
        .await
        .map_err(|_| ApiError::service_unavailable("broker group probe timed out"))?
        .map_err(ApiError::from_stream)?;

    tracing::debug!(
        stream_length = info.length,
        pending = info.pending,
        consumers = info.consumers,
        latency_ms = started.elapsed().as_millis() as u64,
        outcome = "ok",
        "Broker health probe"
    );

    Ok(Json(BrokerHealthResponse {
        status: "ok",
        stream_length: info.length,
        pending: info.pending,
        consumers: info.consumers,
    }))
}
