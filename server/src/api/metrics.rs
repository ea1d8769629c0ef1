//! Prometheus metrics listener
//!
//! Installs the global recorder and serves the rendered registry on its own
//! listener so scrapes never contend with the internal API.

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and build the `/metrics` router
pub fn build_router() -> Result<Router> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    Ok(Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(handle))
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
