//! Shield endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use neonmap_canvas::ShieldRequest;
use neonmap_types::Shield;
use tracing::info;

use crate::error::ApiError;
use crate::schemas::{
    keyed_prices, CreateShieldRequest, CreateShieldResponse, ShieldCheckResponse,
    ShieldPricingResponse, UserShieldResponse,
};
use crate::AppState;

/// `GET /api/shield/pricing`
pub async fn pricing(State(state): State<AppState>) -> Json<ShieldPricingResponse> {
    let shields = state.engine.shields();
    Json(ShieldPricingResponse {
        prices: keyed_prices(shields.prices()),
        durations: shields
            .prices()
            .keys()
            .map(|days| (days.to_string(), *days))
            .collect(),
        size: shields.size(),
        treasury: state.config.payment.treasury.clone(),
        token_mint: state.config.payment.token_mint.clone(),
    })
}

/// `GET /api/shield/active`
pub async fn active(State(state): State<AppState>) -> Result<Json<Vec<Shield>>, ApiError> {
    Ok(Json(state.engine.shields().active().await?))
}

/// `GET /api/shield/user/{wallet}`
pub async fn for_user(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<UserShieldResponse>, ApiError> {
    let shield = state.engine.shields().for_owner(&wallet).await?;
    Ok(Json(UserShieldResponse { shield }))
}

/// `GET /api/shield/check/{x}/{y}`
pub async fn check(
    State(state): State<AppState>,
    coords: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<ShieldCheckResponse>, ApiError> {
    let Path((x, y)) = coords.map_err(|_| ApiError::bad_request("Invalid coordinates"))?;
    let shield = state.engine.shields().is_protected(x, y).await?;
    Ok(Json(ShieldCheckResponse {
        shielded: shield.is_some(),
        shield,
    }))
}

/// `POST /api/shield/create`
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateShieldRequest>, JsonRejection>,
) -> Result<Json<CreateShieldResponse>, ApiError> {
    let Json(req) = payload?;
    info!(wallet = %req.wallet, x = req.x, y = req.y, days = req.duration, "Shield creation request");
    let shield = state
        .engine
        .shields()
        .create(ShieldRequest {
            owner: req.wallet,
            x: req.x,
            y: req.y,
            duration_days: req.duration,
            payment_ref: req.tx_signature,
        })
        .await?;
    Ok(Json(CreateShieldResponse {
        success: true,
        shield,
    }))
}
