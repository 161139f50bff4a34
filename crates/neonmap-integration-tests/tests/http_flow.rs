//! Integration test: the HTTP surface end to end.
//!
//! Drives the daemon router with `oneshot` requests while a subscriber on the
//! event hub plays the part of a connected viewer.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use neonmap_canvas::{DevPaymentVerifier, ManualClock, SqliteStore};
use neonmap_daemon::config::{DaemonConfig, PaymentMode};
use neonmap_daemon::{create_app, AppState};
use neonmap_integration_tests::{solid_png, START_MS};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn setup() -> (Router, AppState, Arc<ManualClock>) {
    let mut config = DaemonConfig::default();
    config.canvas.width = 512;
    config.canvas.height = 512;
    config.canvas.chunk_size = 128;
    config.payment.mode = PaymentMode::Dev;
    config.payment.treasury = "Treasury1111".into();
    config.payment.token_mint = "MapMint1111".into();

    let clock = Arc::new(ManualClock::new(START_MS));
    let store = Arc::new(SqliteStore::open_memory().expect("store"));
    let state = AppState::new(config, store, Arc::new(DevPaymentVerifier), clock.clone())
        .expect("state");
    state.engine.provision().await.expect("provision");
    (create_app(state.clone()), state, clock)
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&body).expect("json")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn post_stamp(fields: &[(&str, &str)], image: Vec<u8>) -> Request<Body> {
    const BOUNDARY: &str = "it-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"s.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&image);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/stamp/place")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .expect("request")
}

#[tokio::test]
async fn viewer_sees_every_accepted_mutation() {
    let (app, state, clock) = setup().await;
    let mut feed = state.engine.events().subscribe();

    let health = body_json(app.clone().oneshot(get("/health")).await.expect("response")).await;
    assert_eq!(health["connections"], 1);

    // Pixel
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/canvas/pixel",
            json!({"wallet": "viewerOne", "x": 300, "y": 20, "color": 11}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let frame = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await
        .expect("event in time")
        .expect("event");
    let event: Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(event["type"], "pixel");
    assert_eq!(event["data"]["x"], 300);
    assert_eq!(event["data"]["color"], 11);
    assert_eq!(event["data"]["wallet"], "viewerOne");
    assert_eq!(event["timestamp"], START_MS);

    // A rejected placement publishes nothing.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/canvas/pixel",
            json!({"wallet": "viewerOne", "x": 301, "y": 20, "color": 11}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(feed.try_recv().is_err());

    // Shield
    clock.advance(1_000);
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/shield/create",
            json!({"wallet": "viewerOne", "x": 400, "y": 400, "duration": 7, "txSignature": "shieldTx"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let frame = feed.recv().await.expect("shield event");
    let event: Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(event["type"], "shield");
    assert_eq!(event["data"]["id"], created["shield"]["id"]);
    assert_eq!(event["data"]["x0"], 384);

    // Stamp
    let response = app
        .clone()
        .oneshot(post_stamp(
            &[
                ("wallet", "artist"),
                ("x", "0"),
                ("y", "0"),
                ("size", "128"),
                ("txSignature", "stampTx"),
            ],
            solid_png(128, 21),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let placed = body_json(response).await;
    assert_eq!(placed["stamp"]["chunksApplied"], 1);
    let frame = feed.recv().await.expect("stamp event");
    let event: Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(event["type"], "stamp");
    assert_eq!(event["data"]["wallet"], "artist");

    let response = app.oneshot(get("/api/canvas/chunk/0/0")).await.expect("response");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(bytes.len(), 128 * 128);
    assert!(bytes.iter().all(|&b| b == 21));
}

#[tokio::test]
async fn pricing_and_profile_endpoints() {
    let (app, _state, _clock) = setup().await;

    let config = body_json(app.clone().oneshot(get("/api/canvas/config")).await.expect("response")).await;
    assert_eq!(config["canvas"]["width"], 512);
    assert_eq!(config["canvas"]["chunkSize"], 128);
    assert_eq!(
        config["freePhaseEnd"].as_u64().expect("u64") - config["launchTimestamp"].as_u64().expect("u64"),
        7 * 24 * 60 * 60 * 1000
    );

    let shield = body_json(app.clone().oneshot(get("/api/shield/pricing")).await.expect("response")).await;
    assert_eq!(shield["treasury"], "Treasury1111");
    assert_eq!(shield["tokenMint"], "MapMint1111");
    assert_eq!(shield["prices"]["1"], 50);

    let stamp = body_json(app.clone().oneshot(get("/api/stamp/pricing")).await.expect("response")).await;
    assert_eq!(stamp["prices"]["128"], 800);
    assert_eq!(stamp["sizes"], json!([32, 64, 128]));

    let user = body_json(app.clone().oneshot(get("/api/user/newcomer")).await.expect("response")).await;
    assert_eq!(user["wallet"], "newcomer");
    assert_eq!(user["nextPixelAt"], START_MS);

    let cooldown = body_json(
        app.oneshot(get("/api/canvas/cooldown/newcomer"))
            .await
            .expect("response"),
    )
    .await;
    assert_eq!(cooldown["cooldownRemaining"], 0);
}
