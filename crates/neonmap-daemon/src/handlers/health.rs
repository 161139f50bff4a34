//! Health check endpoint handler.

use axum::extract::State;
use axum::Json;

use crate::schemas::HealthResponse;
use crate::AppState;

/// `GET /health`: liveness plus the number of connected viewers.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: state.clock.now_ms(),
        connections: state.engine.events().viewer_count(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::test_support::{read_json, test_app};

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["timestamp"], 1_000_000);
        assert_eq!(body["connections"], 0);
    }
}
