use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use devbox_models::{CreateReleaseRequest, ReleaseSummary};
use devbox_orchestrations::{query, ErrorKind, ReleaseError, ReleaseOrchestrator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ReleaseOrchestrator,
    /// Namespace every request operates in
    pub namespace: String,
    pub registry: String,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/devbox/:name/release", get(list_releases).post(create_release))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: AppState) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("✓ API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

// ============================================================================
// Health Check
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "devbox-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Releases
// ============================================================================

async fn list_releases(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ReleaseSummary>>, AppError> {
    let releases = query::list_releases(
        state.orchestrator.gateway().as_ref(),
        &state.namespace,
        &name,
        &state.registry,
    )
    .await?;

    Ok(Json(releases))
}

/// Accept a release and run it in the background.
///
/// The 202 only means the request was valid and the tag was free when it
/// was checked; how the release ends is only visible in the logs and in the
/// release listing.
async fn create_release(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<CreateReleaseRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let plan = state.orchestrator.prepare(&state.namespace, &name, &request).await?;

    tracing::info!(
        release_id = %plan.release_id,
        devbox = %plan.devbox_name,
        tag = %plan.tag,
        was_running = plan.was_running,
        "Release accepted"
    );
    state.orchestrator.spawn(plan);

    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<ReleaseError> for AppError {
    fn from(err: ReleaseError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::InvalidRequest => AppError::BadRequest(message),
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Conflict => AppError::Conflict(message),
            ErrorKind::Internal => {
                tracing::error!(error = %message, "Request failed");
                AppError::Internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use devbox_models::{DevboxState, ReleasePhase};
    use devbox_orchestrations::testing::{devbox, ingress, release_created_at, FakeCluster};
    use devbox_orchestrations::ReleaseSettings;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const NS: &str = "ns-dev";

    fn app(cluster: &Arc<FakeCluster>) -> Router {
        let settings = ReleaseSettings {
            poll_interval: Duration::from_millis(1),
            max_poll_attempts: 20,
        };
        create_router(AppState {
            orchestrator: ReleaseOrchestrator::new(cluster.clone(), settings),
            namespace: NS.to_string(),
            registry: "hub.example.io".to_string(),
        })
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let cluster = Arc::new(FakeCluster::new());
        let response = app(&cluster).oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_list_releases() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_devbox(NS, devbox("demo", "uid-1", DevboxState::Running));
        let success = Some(ReleasePhase::Success);
        cluster.insert_release(NS, release_created_at("demo", "v1", Some("uid-1"), success, 10));
        cluster.insert_release(NS, release_created_at("demo", "v2", Some("uid-1"), None, 20));

        let response = app(&cluster).oneshot(get("/devbox/demo/release")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let releases = body.as_array().unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0]["tag"], "v2");
        assert_eq!(releases[0]["phase"], "Pending");
        assert_eq!(releases[1]["image"], "hub.example.io/ns-dev/demo:v1");
    }

    #[tokio::test]
    async fn test_list_releases_errors() {
        let cluster = Arc::new(FakeCluster::new());

        let response = app(&cluster).oneshot(get("/devbox/Bad_Name/release")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        let response = app(&cluster).oneshot(get("/devbox/missing/release")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_release_accepted_and_runs_in_background() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_devbox(NS, devbox("demo1", "uid-1", DevboxState::Stopped));
        cluster.insert_ingress(NS, ingress("demo1", "web", Some("pause"), None));
        cluster.script_release("demo1", "v1", 1, ReleasePhase::Success);

        let response = app(&cluster)
            .oneshot(post(
                "/devbox/demo1/release",
                r#"{"tag":"v1","releaseDes":"first","startDevboxAfterRelease":true}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        for _ in 0..200 {
            if cluster.devbox_state(NS, "demo1") == Some(DevboxState::Running) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cluster.devbox_state(NS, "demo1"), Some(DevboxState::Running));
        assert_eq!(cluster.releases_of(NS, "demo1").len(), 1);
        assert_eq!(cluster.ingress_class(NS, "web"), (Some("nginx".to_string()), None));
    }

    #[tokio::test]
    async fn test_create_release_rejections() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_devbox(NS, devbox("demo", "uid-1", DevboxState::Running));
        cluster.insert_release(NS, release_created_at("demo", "v1", Some("uid-1"), None, 0));

        let cases = [
            ("/devbox/demo/release", "not json", StatusCode::BAD_REQUEST),
            ("/devbox/demo/release", r#"{"releaseDes":"no tag"}"#, StatusCode::BAD_REQUEST),
            ("/devbox/demo/release", r#"{"tag":"Bad Tag"}"#, StatusCode::BAD_REQUEST),
            ("/devbox/Bad_Name/release", r#"{"tag":"v2"}"#, StatusCode::BAD_REQUEST),
            ("/devbox/missing/release", r#"{"tag":"v2"}"#, StatusCode::NOT_FOUND),
            ("/devbox/demo/release", r#"{"tag":"v1"}"#, StatusCode::CONFLICT),
        ];

        for (uri, body, expected) in cases {
            let response = app(&cluster).oneshot(post(uri, body)).await.unwrap();
            assert_eq!(response.status(), expected, "{} {}", uri, body);
            assert!(json_body(response).await["error"].is_string());
        }

        // Nothing was paused or created by a rejected request
        assert!(cluster.devbox_state_history(NS, "demo").is_empty());
        assert_eq!(cluster.releases_of(NS, "demo").len(), 1);
    }

    #[tokio::test]
    async fn test_create_release_object_name_taken() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_devbox(NS, devbox("a", "uid-a", DevboxState::Running));
        cluster.insert_devbox(NS, devbox("a-b", "uid-ab", DevboxState::Running));
        cluster.insert_release(NS, release_created_at("a", "b-c", Some("uid-a"), None, 0));

        let response = app(&cluster)
            .oneshot(post("/devbox/a-b/release", r#"{"tag":"c"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(cluster.devbox_state_history(NS, "a-b").is_empty());
        assert!(cluster.releases_of(NS, "a-b").is_empty());
    }
}
