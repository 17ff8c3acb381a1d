//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{alerts, health, metrics, opportunities, ready, status, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Query endpoints
        .route("/api/v1/status", get(status))
        .route("/api/v1/opportunities", get(opportunities))
        .route("/api/v1/alerts", get(alerts))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::cache::{CacheConfig, Namespace, OpportunityCache};
    use crate::engine::{DataSource, LatestOpportunities, LATEST_OPPORTUNITIES_KEY};

    fn state() -> AppState {
        AppState::new(Arc::new(OpportunityCache::new(CacheConfig::default())))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (status, body) = get_json(create_router(state()), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn ready_endpoint_returns_503_when_not_ready() {
        let (status, _) = get_json(create_router(state()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_200_when_ready() {
        let state = state();
        state.set_ready(true);

        let (status, _) = get_json(create_router(state), "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn opportunities_endpoint_reads_cache() {
        let state = state();
        state
            .cache
            .set(
                Namespace::Opportunities,
                LATEST_OPPORTUNITIES_KEY,
                &LatestOpportunities {
                    tick: 7,
                    data_source: DataSource::Degraded,
                    opportunities: Vec::new(),
                },
            )
            .unwrap();

        let (status, body) = get_json(create_router(state), "/api/v1/opportunities").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tick"], 7);
        assert_eq!(body["dataSource"], "degraded");
    }

    #[tokio::test]
    async fn status_endpoint_reports_starting() {
        let (status, body) = get_json(create_router(state()), "/api/v1/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "starting");
        assert!(body["cacheStats"].is_object());
    }

    #[tokio::test]
    async fn alerts_endpoint_starts_empty() {
        let (status, body) = get_json(create_router(state()), "/api/v1/alerts?limit=5").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn metrics_without_exporter_is_unavailable() {
        let (status, _) = get_json(create_router(state()), "/metrics").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
