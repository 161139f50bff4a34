//! Canvas endpoints: configuration, chunk reads and single pixel placement.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use neonmap_canvas::CanvasError;
use neonmap_types::palette;

use crate::error::ApiError;
use crate::schemas::{CanvasConfigResponse, CooldownResponse, PixelRequest, PixelResponse};
use crate::AppState;

/// `GET /api/canvas/config`
pub async fn config(State(state): State<AppState>) -> Json<CanvasConfigResponse> {
    let canvas = &state.config.canvas;
    Json(CanvasConfigResponse {
        canvas: state.engine.settings().geometry,
        launch_timestamp: canvas.launch_timestamp_ms,
        free_phase_end: canvas.free_phase_end_ms(),
        server_time: state.clock.now_ms(),
        cooldown_seconds: state.engine.settings().cooldown_secs,
        palette: palette::hex_colors(),
    })
}

/// `GET /api/canvas/chunk/{cx}/{cy}`: raw palette indices, row-major.
pub async fn chunk(
    State(state): State<AppState>,
    coords: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::bad_request("Invalid chunk coordinates");
    let Path((cx, cy)) = coords.map_err(|_| invalid())?;
    let chunk = match state.engine.chunks().coord(cx, cy) {
        Ok(chunk) => chunk,
        Err(CanvasError::OutOfBounds(_)) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    let data = state.engine.chunks().get(chunk).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

/// `POST /api/canvas/pixel`
pub async fn place_pixel(
    State(state): State<AppState>,
    payload: Result<Json<PixelRequest>, JsonRejection>,
) -> Result<Json<PixelResponse>, ApiError> {
    let Json(req) = payload.map_err(|_| ApiError::bad_request("Invalid pixel data"))?;
    let outcome = state
        .engine
        .arbitrator()
        .place(&req.wallet, req.x, req.y, req.color)
        .await?;
    Ok(Json(PixelResponse {
        success: true,
        pixel: outcome.pixel,
        next_pixel_at: outcome.next_pixel_at,
    }))
}

/// `GET /api/canvas/cooldown/{wallet}`
pub async fn cooldown(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<CooldownResponse>, ApiError> {
    let status = state.engine.arbitrator().cooldown(&wallet).await?;
    Ok(Json(status.into()))
}
