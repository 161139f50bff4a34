//! Wallet profile endpoint.

use axum::extract::{Path, State};
use axum::Json;

use crate::error::ApiError;
use crate::schemas::UserResponse;
use crate::AppState;

/// `GET /api/user/{wallet}`: creates the wallet row on first contact.
pub async fn profile(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let (user, next_pixel_at) = state.engine.arbitrator().profile(&wallet).await?;
    Ok(Json(UserResponse {
        wallet: user.wallet,
        twitter: user.twitter,
        next_pixel_at,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::test_support::{read_json, test_app};

    #[tokio::test]
    async fn test_profile_tracks_cooldown() {
        let (app, clock) = test_app().await;
        let get = || {
            Request::builder()
                .uri("/api/user/w1")
                .body(Body::empty())
                .expect("request")
        };

        let body = read_json(app.clone().oneshot(get()).await.expect("response")).await;
        assert_eq!(body["wallet"], "w1");
        assert!(body["twitter"].is_null());
        assert_eq!(body["nextPixelAt"], 1_000_000);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/canvas/pixel")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"wallet": "w1", "x": 0, "y": 0, "color": 2}).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        clock.advance(10_000);
        let body = read_json(app.oneshot(get()).await.expect("response")).await;
        assert_eq!(body["nextPixelAt"], 1_060_000);
    }

    #[tokio::test]
    async fn test_rejects_malformed_wallet() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/user/not%20a%20wallet")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
