//! # neonmap-daemon
//!
//! HTTP and WebSocket surface of the NeonMap canvas server.
//!
//! Routes:
//!
//! - `/api/canvas`: config, chunk reads, pixel placement, cooldowns
//! - `/api/shield`: pricing, active shields, purchase
//! - `/api/stamp`: pricing, preview, purchase
//! - `/api/user`: wallet profile
//! - `/ws`: real-time canvas events
//! - `/health`

pub mod config;
pub mod error;
pub mod handlers;
pub mod schemas;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use neonmap_canvas::{
    CanvasEngine, Clock, DevPaymentVerifier, PaymentVerifierBoxed, RpcPaymentVerifier, SqliteStore,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::{ConfigError, DaemonConfig, PaymentConfig, PaymentMode};

/// Room for multipart framing and text fields on top of the image itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CanvasEngine<SqliteStore>>,
    pub config: Arc<DaemonConfig>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Validate `config` and build the engine over `store`.
    pub fn new(
        config: DaemonConfig,
        store: Arc<SqliteStore>,
        verifier: Arc<dyn PaymentVerifierBoxed>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let settings = config.engine_settings()?;
        let engine = CanvasEngine::new(settings, store, verifier, Arc::clone(&clock));
        Ok(Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
            clock,
        })
    }
}

/// Pick the payment verifier named by the configuration.
pub fn build_verifier(config: &PaymentConfig) -> anyhow::Result<Arc<dyn PaymentVerifierBoxed>> {
    match config.mode {
        PaymentMode::Dev => {
            warn!("Payment verification disabled (dev mode): every signature is accepted");
            Ok(Arc::new(DevPaymentVerifier))
        }
        PaymentMode::Rpc => {
            if config.treasury.is_empty() || config.token_mint.is_empty() {
                anyhow::bail!("payment.treasury and payment.token_mint are required in rpc mode");
            }
            let verifier = RpcPaymentVerifier::new(
                config.rpc_url.clone(),
                config.treasury.clone(),
                config.token_mint.clone(),
                config.token_decimals,
                Duration::from_secs(config.verify_timeout_secs),
            )?;
            Ok(Arc::new(verifier))
        }
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    if origin.is_empty() {
        return layer.allow_origin(tower_http::cors::Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(e) => {
            warn!(origin, "Ignoring invalid CORS origin: {}", e);
            layer
        }
    }
}

/// Build the application router.
pub fn create_app(state: AppState) -> Router {
    use crate::handlers::{canvas, health, shield, stamp, user, ws};

    let upload_limit = state
        .config
        .server
        .max_upload_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    let canvas_routes = Router::new()
        .route("/config", get(canvas::config))
        .route("/chunk/{cx}/{cy}", get(canvas::chunk))
        .route("/pixel", post(canvas::place_pixel))
        .route("/cooldown/{wallet}", get(canvas::cooldown));

    let shield_routes = Router::new()
        .route("/pricing", get(shield::pricing))
        .route("/active", get(shield::active))
        .route("/user/{wallet}", get(shield::for_user))
        .route("/check/{x}/{y}", get(shield::check))
        .route("/create", post(shield::create));

    let stamp_routes = Router::new()
        .route("/pricing", get(stamp::pricing))
        .route("/preview", post(stamp::preview))
        .route("/place", post(stamp::place))
        .layer(DefaultBodyLimit::max(upload_limit));

    let user_routes = Router::new().route("/{wallet}", get(user::profile));

    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(ws::ws_handler))
        .nest("/api/canvas", canvas_routes)
        .nest("/api/shield", shield_routes)
        .nest("/api/stamp", stamp_routes)
        .nest("/api/user", user_routes)
        .layer(cors_layer(&state.config.server.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
