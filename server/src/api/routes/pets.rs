//! Per-pet cluster state endpoints

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;

use crate::api::ApiState;
use crate::api::types::ApiError;
use crate::domain::cluster::ClusterDescriptor;

/// Latest cached descriptor for a pet; 404 when nothing is cached (or the
/// TTL lapsed). Reads bypass the workers entirely.
pub async fn get_pet_clusters(
    State(state): State<ApiState>,
    Path(pet_id): Path<String>,
) -> Result<Json<ClusterDescriptor>, ApiError> {
    let started = Instant::now();

    let descriptor = state
        .cache
        .get_descriptor(&pet_id)
        .await
        .map_err(ApiError::from_cache)?;

    match descriptor {
        Some(descriptor) => {
            tracing::info!(
                pet_id = %pet_id,
                clusters = descriptor.clusters.len(),
                latency_ms = started.elapsed().as_millis() as u64,
                outcome = "hit",
                "Cluster state read"
            );
            Ok(Json(descriptor))
        }
        None => {
            tracing::info!(
                pet_id = %pet_id,
                latency_ms = started.elapsed().as_millis() as u64,
                outcome = "miss",
                "Cluster state read"
            );
            Err(ApiError::not_found(
                "CLUSTER_STATE_NOT_FOUND",
                format!("no cluster state cached for pet {pet_id}"),
            ))
        }
    }
}

#[derive(Serialize)]
pub struct InvalidateResponse {
    pub status: &'static str,
}

/// Authoritatively drop a pet's cached state. The response distinguishes
/// `removed` from `noop` so callers can tell whether anything was there.
pub async fn invalidate_pet_clusters(
    State(state): State<ApiState>,
    Path(pet_id): Path<String>,
) -> Result<(StatusCode, Json<InvalidateResponse>), ApiError> {
    let started = Instant::now();

    let existed = state
        .cache
        .invalidate(&pet_id)
        .await
        .map_err(ApiError::from_cache)?;

    let status = if existed { "removed" } else { "noop" };
    tracing::info!(
        pet_id = %pet_id,
        latency_ms = started.elapsed().as_millis() as u64,
        outcome = status,
        "Cluster state invalidated"
    );

    Ok((StatusCode::ACCEPTED, Json(InvalidateResponse { status })))
}
