//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::auth::{AuthState, require_internal_token};
use super::routes::{health, jobs, pets};
use super::{ApiState, metrics};
use crate::core::config::AppConfig;
use crate::core::constants::{DEFAULT_BODY_LIMIT, REQUEST_TIMEOUT_SECS};
use crate::core::shutdown::ShutdownService;
use crate::data::cache::ClusterCache;
use crate::data::stream::StreamService;

pub struct ApiServer {
    state: ApiState,
    auth: AuthState,
    host: String,
    port: u16,
}

impl ApiServer {
    pub fn new(
        config: &AppConfig,
        streams: Arc<StreamService>,
        cache: Arc<ClusterCache>,
    ) -> Self {
        Self {
            state: ApiState { streams, cache },
            auth: AuthState {
                internal_token: config.auth.internal_token.clone(),
            },
            host: config.server.host.clone(),
            port: config.server.port,
        }
    }

    /// Assemble the router: a liveness probe in the open, everything else
    /// behind the internal-token middleware.
    pub fn build_router(state: ApiState, auth: AuthState) -> Router {
        let internal = Router::new()
            .route("/cluster-jobs", post(jobs::enqueue_job))
            .route("/pets/{pet_id}/clusters", get(pets::get_pet_clusters))
            .route("/pets/{pet_id}/invalidate", post(pets::invalidate_pet_clusters))
            .route("/health/redis", get(health::redis_health))
            .layer(axum::middleware::from_fn_with_state(
                auth,
                require_internal_token,
            ))
            .with_state(state);

        Router::new()
            .route("/healthz", get(health::healthz))
            .nest("/internal", internal)
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
    }

    /// Bind and serve until shutdown is triggered
    pub async fn start(self, shutdown: &ShutdownService) -> Result<()> {
        let router = Self::build_router(self.state, self.auth);
        let addr = SocketAddr::new(self.host.parse()?, self.port);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "Internal API listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::debug!("Internal API stopped");
        Ok(())
    }
}

/// Spawn the Prometheus listener on its own port
pub async fn start_metrics_server(
    config: &AppConfig,
    shutdown: &ShutdownService,
) -> Result<()> {
    let router = metrics::build_router()?;
    let addr = SocketAddr::new(config.metrics.host.parse()?, config.metrics.port);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Metrics listening");

    let wait = shutdown.wait();
    shutdown.register(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(wait)
            .await
        {
            tracing::error!(error = %e, "Metrics server error");
        }
    }));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::InMemoryCache;
    use crate::data::stream::{MemoryStreamBackend, StreamTopology};
    use crate::domain::cluster::{Cluster, ClusterDescriptor, ClusterMember, ClusterMetrics};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    struct Fixture {
        router: Router,
        backend: Arc<MemoryStreamBackend>,
        cache: Arc<ClusterCache>,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(MemoryStreamBackend::new());
        let streams = Arc::new(StreamService::new(
            backend.clone(),
            StreamTopology {
                stream: "streams:media.cluster".to_string(),
                group: "media-clustering-workers".to_string(),
                dead_letter_stream: "streams:media.cluster.deadletter".to_string(),
                maxlen: 100,
                approximate_trim: true,
            },
        ));
        streams.ensure_group().await.unwrap();

        let cache = Arc::new(ClusterCache::new(
            Arc::new(InMemoryCache::new()),
            "sploot",
            Duration::from_secs(60),
        ));

        let router = ApiServer::build_router(
            ApiState {
                streams,
                cache: cache.clone(),
            },
            AuthState {
                internal_token: TOKEN.to_string(),
            },
        );

        Fixture {
            router,
            backend,
            cache,
        }
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("x-internal-token", token);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header("x-internal-token", token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sample_descriptor(pet_id: &str) -> ClusterDescriptor {
        let now = Utc::now();
        ClusterDescriptor {
            pet_id: pet_id.to_string(),
            clusters: vec![Cluster {
                id: format!("{pet_id}-cluster-0"),
                label: None,
                hero_image_id: "a".to_string(),
                members: vec![ClusterMember {
                    image_id: "a".to_string(),
                    score: 1.0,
                    position: 0,
                }],
            }],
            metrics: ClusterMetrics {
                coverage: BTreeMap::new(),
                quality_score: 1.0,
                processed_at: now,
                strategy_version: "heuristic-v1".to_string(),
            },
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_healthz_requires_no_token() {
        let fx = fixture().await;
        let response = fx.router.oneshot(get("/healthz", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_wrong_token_is_401_with_fixed_body() {
        let fx = fixture().await;
        let response = fx
            .router
            .oneshot(get("/internal/pets/p1/clusters", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "detail": "invalid internal token" })
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let fx = fixture().await;
        let response = fx
            .router
            .oneshot(get("/internal/health/redis", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_runs_before_body_parsing() {
        let fx = fixture().await;
        // Invalid JSON body, invalid token: the token must decide
        let response = fx
            .router
            .oneshot(post_json("/internal/cluster-jobs", Some("wrong"), "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_enqueue_job_appends_to_stream() {
        let fx = fixture().await;
        let body = r#"{
            "pet_id": "p1",
            "payload": {"image_ids": ["a", "b", "c"], "labels": ["L"], "quality_score": 1.0}
        }"#;

        let response = fx
            .router
            .oneshot(post_json("/internal/cluster-jobs", Some(TOKEN), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let json = body_json(response).await;
        assert_eq!(json["status"], "accepted");
        let job_id = json["job_id"].as_str().unwrap();
        assert!(!job_id.is_empty());

        let entries = fx.backend.entries("streams:media.cluster");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field("pet_id"), Some("p1"));
        assert_eq!(entries[0].field("job_id"), Some(job_id));
        assert_eq!(entries[0].field("attempts"), Some("0"));
    }

    #[tokio::test]
    async fn test_enqueue_keeps_caller_job_id() {
        let fx = fixture().await;
        let body = r#"{"pet_id": "p1", "job_id": "job-42"}"#;

        let response = fx
            .router
            .oneshot(post_json("/internal/cluster-jobs", Some(TOKEN), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["job_id"], "job-42");
    }

    #[tokio::test]
    async fn test_enqueue_without_pet_id_is_400() {
        let fx = fixture().await;
        let response = fx
            .router
            .oneshot(post_json("/internal/cluster-jobs", Some(TOKEN), r#"{"reason": "x"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_clusters_miss_is_404_then_hit_after_put() {
        let fx = fixture().await;

        let response = fx
            .router
            .clone()
            .oneshot(get("/internal/pets/p1/clusters", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        fx.cache
            .put_descriptor(&sample_descriptor("p1"))
            .await
            .unwrap();

        let response = fx
            .router
            .oneshot(get("/internal/pets/p1/clusters", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["pet_id"], "p1");
        assert_eq!(json["clusters"][0]["hero_image_id"], "a");
    }

    #[tokio::test]
    async fn test_invalidate_removed_then_noop() {
        let fx = fixture().await;
        fx.cache
            .put_descriptor(&sample_descriptor("p1"))
            .await
            .unwrap();

        let response = fx
            .router
            .clone()
            .oneshot(post_json("/internal/pets/p1/invalidate", Some(TOKEN), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["status"], "removed");

        let response = fx
            .router
            .clone()
            .oneshot(get("/internal/pets/p1/clusters", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = fx
            .router
            .oneshot(post_json("/internal/pets/p1/invalidate", Some(TOKEN), ""))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "noop");
    }

    #[tokio::test]
    async fn test_redis_health_reports_group_stats() {
        let fx = fixture().await;
        let response = fx
            .router
            .oneshot(get("/internal/health/redis", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["pending"], 0);
    }
}
