//! Request and response bodies of the HTTP API.
//!
//! Field names are camelCase on the wire.

use std::collections::BTreeMap;

use neonmap_canvas::{CooldownStatus, StampOutcome};
use neonmap_types::{CanvasGeometry, PlacementRecord, Shield};
use serde::{Deserialize, Serialize};

/// `GET /api/canvas/config`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasConfigResponse {
    pub canvas: CanvasGeometry,
    pub launch_timestamp: u64,
    pub free_phase_end: u64,
    pub server_time: u64,
    pub cooldown_seconds: u64,
    /// Palette as `#RRGGBB`, indexed by color.
    pub palette: Vec<String>,
}

/// `POST /api/canvas/pixel`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixelRequest {
    pub wallet: String,
    pub x: i64,
    pub y: i64,
    pub color: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelResponse {
    pub success: bool,
    pub pixel: PlacementRecord,
    pub next_pixel_at: u64,
}

/// `GET /api/canvas/cooldown/{wallet}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownResponse {
    pub next_pixel_at: u64,
    pub cooldown_remaining: u64,
}

impl From<CooldownStatus> for CooldownResponse {
    fn from(status: CooldownStatus) -> Self {
        Self {
            next_pixel_at: status.next_pixel_at,
            cooldown_remaining: status.cooldown_remaining,
        }
    }
}

/// `GET /api/shield/pricing`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldPricingResponse {
    /// Duration in days → price.
    pub prices: BTreeMap<String, u64>,
    /// Duration key → days.
    pub durations: BTreeMap<String, u32>,
    pub size: u32,
    pub treasury: String,
    pub token_mint: String,
}

/// `GET /api/shield/user/{wallet}`
#[derive(Debug, Serialize)]
pub struct UserShieldResponse {
    pub shield: Option<Shield>,
}

/// `GET /api/shield/check/{x}/{y}`
#[derive(Debug, Serialize)]
pub struct ShieldCheckResponse {
    pub shielded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shield: Option<Shield>,
}

/// `POST /api/shield/create`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShieldRequest {
    pub wallet: String,
    pub x: i64,
    pub y: i64,
    /// Days.
    pub duration: u32,
    pub tx_signature: String,
}

#[derive(Debug, Serialize)]
pub struct CreateShieldResponse {
    pub success: bool,
    pub shield: Shield,
}

/// `GET /api/stamp/pricing`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StampPricingResponse {
    /// Stamp edge → price.
    pub prices: BTreeMap<String, u64>,
    pub sizes: Vec<u32>,
    pub treasury: String,
    pub token_mint: String,
}

/// `POST /api/stamp/place`
#[derive(Debug, Serialize)]
pub struct PlaceStampResponse {
    pub success: bool,
    pub stamp: StampOutcome,
}

/// `GET /api/user/{wallet}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub wallet: String,
    pub twitter: Option<String>,
    pub next_pixel_at: u64,
}

/// `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub connections: usize,
}

/// Price tables keyed by their decimal string, as JSON objects require.
pub fn keyed_prices(prices: &BTreeMap<u32, u64>) -> BTreeMap<String, u64> {
    prices.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}
