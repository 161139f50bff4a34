//! API error handling for HTTP handlers.
//!
//! Every error is a JSON object `{ "error": <message>, ... }`.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use neonmap_canvas::CanvasError;
use neonmap_types::ChunkCoord;
use serde_json::json;
use tracing::error;

/// API error type for handler responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request or business-rule rejection (400).
    BadRequest(String),
    /// Target protected by someone else's shield (403).
    Forbidden(String),
    /// Not found (404).
    NotFound(String),
    /// Upload above the configured limit (413).
    PayloadTooLarge,
    /// Wallet still cooling down (429).
    Cooldown {
        cooldown_remaining: u64,
        next_pixel_at: u64,
    },
    /// A paid stamp reached only some of its chunks (500).
    PartialStamp {
        applied: Vec<ChunkCoord>,
        failed: Vec<ChunkCoord>,
    },
    /// Internal server error (500). The cause is logged, never returned.
    Internal(String),
}

impl ApiError {
    /// Create internal server error from any error type.
    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<CanvasError> for ApiError {
    fn from(e: CanvasError) -> Self {
        match e {
            CanvasError::InvalidInput(msg) | CanvasError::OutOfBounds(msg) => Self::BadRequest(msg),
            CanvasError::CooldownActive {
                remaining_secs,
                next_placement_at,
            } => Self::Cooldown {
                cooldown_remaining: remaining_secs,
                next_pixel_at: next_placement_at,
            },
            CanvasError::RegionProtected { .. } => {
                Self::Forbidden("This area is protected by a shield".into())
            }
            CanvasError::PartiallyApplied { applied, failed } => Self::PartialStamp { applied, failed },
            CanvasError::NotFound(msg) => Self::NotFound(msg),
            e @ (CanvasError::InvalidDuration(_)
            | CanvasError::DuplicateShield { .. }
            | CanvasError::RegionOverlap { .. }
            | CanvasError::PaymentInvalid(_)
            | CanvasError::PaymentAlreadyUsed
            | CanvasError::InvalidImage(_)
            | CanvasError::InvalidSize(_)) => Self::BadRequest(e.to_string()),
            e @ (CanvasError::Store(_) | CanvasError::Internal(_)) => Self::internal(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge
        } else {
            Self::BadRequest(e.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({ "error": "Upload exceeds the size limit" }),
            ),
            ApiError::Cooldown {
                cooldown_remaining,
                next_pixel_at,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "Cooldown active",
                    "cooldownRemaining": cooldown_remaining,
                    "nextPixelAt": next_pixel_at,
                }),
            ),
            ApiError::PartialStamp { applied, failed } => {
                error!(applied = applied.len(), failed = failed.len(), "Stamp partially applied");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Stamp partially applied",
                        "appliedChunks": applied,
                        "failedChunks": failed,
                    }),
                )
            }
            ApiError::Internal(cause) => {
                error!(%cause, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CanvasError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (CanvasError::OutOfBounds("x".into()), StatusCode::BAD_REQUEST),
            (
                CanvasError::CooldownActive {
                    remaining_secs: 3,
                    next_placement_at: 10,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                CanvasError::RegionProtected {
                    shield_id: "s".into(),
                    owner: "o".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (CanvasError::InvalidDuration(2), StatusCode::BAD_REQUEST),
            (
                CanvasError::RegionOverlap {
                    shield_id: "s".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (CanvasError::PaymentAlreadyUsed, StatusCode::BAD_REQUEST),
            (CanvasError::InvalidSize(48), StatusCode::BAD_REQUEST),
            (CanvasError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CanvasError::Internal("db gone".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                CanvasError::PartiallyApplied {
                    applied: vec![],
                    failed: vec![ChunkCoord { cx: 0, cy: 0 }],
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let label = err.to_string();
            assert_eq!(ApiError::from(err).into_response().status(), status, "{label}");
        }
    }

    #[tokio::test]
    async fn test_internal_error_hides_cause() {
        let response = ApiError::from(CanvasError::Internal("disk on fire".into())).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(!text.contains("disk on fire"));
        assert!(text.contains("Internal server error"));
    }

    #[tokio::test]
    async fn test_cooldown_body() {
        let response = ApiError::Cooldown {
            cooldown_remaining: 42,
            next_pixel_at: 1_000,
        }
        .into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["error"], "Cooldown active");
        assert_eq!(value["cooldownRemaining"], 42);
        assert_eq!(value["nextPixelAt"], 1_000);
    }
}
