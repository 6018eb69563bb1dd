//! # dispatch-api
//!
//! Admin HTTP control plane (spec.md §4.8/§6): read-only overview/trend/
//! worker/incident views plus the mutating pause/resume/drain/clean/retry/
//! cancel/acknowledge/resolve operations, all gated behind a shared admin
//! key and all writing an [`dispatch_core::AuditLogEntry`] before answering
//! success.
//!
//! Grounded on the teacher-sibling repo's Axum wiring
//! (`examples/fourthplaces-mntogether/packages/server/src/server/app.rs`):
//! a `Router` built from `State`, layered with `TraceLayer`/`CorsLayer` and
//! the client-IP/admin-key middleware pair in [`middleware`].

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::{Method, StatusCode};
use axum::routing::{delete, get, post};
use axum::{BoxError, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::{AppState, DashboardCache};

/// Builds the full `/admin/worker-monitor` + `/dashboard` router (spec.md
/// §6). `apps/server` nests this under the listener it binds.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/overview", get(routes::overview::overview))
        .route("/queues", get(routes::overview::list_queues))
        .route("/queues/:name/trend", get(routes::overview::trend))
        .route("/queues/:name/jobs", get(routes::control::list_jobs))
        .route("/queues/:name/jobs/:job_id", get(routes::control::get_job))
        .route("/queues/:name/pause", post(routes::control::pause))
        .route("/queues/:name/resume", post(routes::control::resume))
        .route("/queues/:name/retry-failed", post(routes::control::retry_failed))
        .route("/queues/:name/drain", delete(routes::control::drain))
        .route("/queues/:name/clean", delete(routes::control::clean))
        .route("/queues/:name/jobs/:job_id/retry", post(routes::control::retry_job))
        .route("/queues/:name/jobs/:job_id/cancel", post(routes::control::cancel_job))
        .route("/workers", get(routes::workers::workers))
        .route("/incidents", get(routes::incidents::list_incidents))
        .route("/incidents/:id/acknowledge", post(routes::incidents::acknowledge))
        .route("/incidents/:id/resolve", post(routes::incidents::resolve))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_admin_key));

    let dashboard = Router::new().route("/active-runs", get(routes::dashboard::active_runs));

    let cors = CorsLayer::new().allow_origin(tower_http::cors::Any).allow_methods([
        Method::GET,
        Method::POST,
        Method::DELETE,
    ]);

    Router::new()
        .nest("/admin/worker-monitor", admin)
        .nest("/dashboard", dashboard)
        .layer(axum::middleware::from_fn(middleware::extract_client_ip))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // Control-plane HTTP operations bound to 10s (spec.md §5).
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|_: BoxError| async { StatusCode::REQUEST_TIMEOUT }))
                .timeout(Duration::from_secs(10)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use dispatch_core::EnqueueOptions;
    use dispatch_scheduler::IncidentDetector;
    use dispatch_testing::{
        InMemoryAuditStore, InMemoryHeartbeatRegistry, InMemoryIncidentStore, InMemoryJobQueue,
        InMemoryRunStore, InMemorySnapshotStore,
    };

    use super::*;

    const KEY: &str = "test-admin-key";

    fn test_state() -> AppState {
        let snapshot_store: Arc<dyn dispatch_core::SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
        let incident_store: Arc<dyn dispatch_core::IncidentStore> = Arc::new(InMemoryIncidentStore::new());
        let audit: Arc<dyn dispatch_core::AuditStore> = Arc::new(InMemoryAuditStore::new());

        AppState {
            queue: Arc::new(InMemoryJobQueue::new()),
            registry: Arc::new(InMemoryHeartbeatRegistry::new()),
            run_store: Arc::new(InMemoryRunStore::new()),
            snapshot_store: snapshot_store.clone(),
            incident_store: incident_store.clone(),
            incident_detector: Arc::new(IncidentDetector::new(
                snapshot_store,
                incident_store,
                audit.clone(),
                vec!["cafe-jobs".to_string()],
            )),
            audit,
            queue_names: Arc::new(vec!["cafe-jobs".to_string()]),
            admin_api_key: Arc::from(KEY),
            dashboard_cache: Arc::new(DashboardCache::new()),
        }
    }

    fn authed(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {KEY}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn overview_requires_admin_key() {
        let app = build_router(test_state());
        let req = Request::builder()
            .uri("/admin/worker-monitor/overview")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn overview_rejects_wrong_key() {
        let app = build_router(test_state());
        let req = Request::builder()
            .uri("/admin/worker-monitor/overview")
            .header("authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn overview_lists_known_queues() {
        let app = build_router(test_state());
        let resp = app.oneshot(authed("GET", "/admin/worker-monitor/overview")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["queues"].as_array().unwrap().len(), 1);
        assert_eq!(body["queues"][0]["queue_name"], "cafe-jobs");
    }

    #[tokio::test]
    async fn unknown_queue_404s() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(authed("GET", "/admin/worker-monitor/queues/nonexistent/jobs"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pause_then_pause_again_conflicts() {
        let state = test_state();
        let app = build_router(state);

        let resp = app
            .clone()
            .oneshot(authed("POST", "/admin/worker-monitor/queues/cafe-jobs/pause"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(authed("POST", "/admin/worker-monitor/queues/cafe-jobs/pause"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn drain_requires_confirm_token() {
        let app = build_router(test_state());
        let req = Request::builder()
            .method("DELETE")
            .uri("/admin/worker-monitor/queues/cafe-jobs/drain")
            .header("authorization", format!("Bearer {KEY}"))
            .header("content-type", "application/json")
            .body(Body::from(json!({"confirm": "wrong-name"}).to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_job_reports_404_for_unknown_job() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(authed("POST", "/admin/worker-monitor/queues/cafe-jobs/jobs/missing/cancel"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn retry_job_on_a_failed_job_audits_and_succeeds() {
        let state = test_state();
        state
            .queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        let job = state.queue.reserve("cafe-jobs", "w1").await.unwrap().unwrap();
        state
            .queue
            .fail("cafe-jobs", &job.id, dispatch_core::ErrorCode::PermissionDenied, "nope")
            .await
            .unwrap();

        let app = build_router(state.clone());
        let resp = app
            .oneshot(authed("POST", &format!("/admin/worker-monitor/queues/cafe-jobs/jobs/{}/retry", job.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let audited = state.audit.list(Default::default(), 0, 10).await.unwrap();
        assert!(audited.iter().any(|e| e.action == "RETRY" && e.entity_id == job.id));
    }

    #[tokio::test]
    async fn dashboard_active_runs_does_not_require_admin_key() {
        let app = build_router(test_state());
        let resp = app.oneshot(authed("GET", "/dashboard/active-runs")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
