//! Stamp endpoints. Uploads arrive as multipart forms with an `image` part.

use std::collections::HashMap;

use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use neonmap_canvas::StampRequest;
use tracing::info;

use crate::error::ApiError;
use crate::schemas::{keyed_prices, PlaceStampResponse, StampPricingResponse};
use crate::AppState;

const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

const DEFAULT_STAMP_SIZE: u32 = 64;

/// A parsed stamp upload.
#[derive(Debug, Default)]
struct StampForm {
    image: Option<Vec<u8>>,
    fields: HashMap<String, String>,
}

impl StampForm {
    async fn read(mut multipart: Multipart, max_image_bytes: usize) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                let allowed = field
                    .content_type()
                    .is_some_and(|ct| ALLOWED_IMAGE_TYPES.contains(&ct));
                if !allowed {
                    return Err(ApiError::bad_request(
                        "Unsupported image type; expected PNG, JPEG or WebP",
                    ));
                }
                let bytes = field.bytes().await?;
                if bytes.len() > max_image_bytes {
                    return Err(ApiError::PayloadTooLarge);
                }
                form.image = Some(bytes.to_vec());
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    fn take_image(&mut self) -> Result<Vec<u8>, ApiError> {
        self.image
            .take()
            .ok_or_else(|| ApiError::bad_request("No image provided"))
    }

    fn text(&self, name: &str) -> String {
        self.fields.get(name).map(|v| v.trim().to_string()).unwrap_or_default()
    }

    fn size(&self) -> Result<u32, ApiError> {
        match self.fields.get("size") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ApiError::bad_request("Invalid size")),
            None => Ok(DEFAULT_STAMP_SIZE),
        }
    }

    fn coordinate(&self, name: &str) -> Result<i64, ApiError> {
        self.fields
            .get(name)
            .and_then(|raw| raw.trim().parse().ok())
            .ok_or_else(|| ApiError::bad_request("Invalid coordinates"))
    }
}

/// `GET /api/stamp/pricing`
pub async fn pricing(State(state): State<AppState>) -> Json<StampPricingResponse> {
    let prices = state.engine.stamps().prices();
    Json(StampPricingResponse {
        prices: keyed_prices(prices),
        sizes: prices.keys().copied().collect(),
        treasury: state.config.payment.treasury.clone(),
        token_mint: state.config.payment.token_mint.clone(),
    })
}

/// `POST /api/stamp/preview`: the quantized image rendered back as PNG.
pub async fn preview(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = StampForm::read(multipart, state.config.server.max_upload_bytes).await?;
    let image = form.take_image()?;
    let size = form.size()?;
    let png = state.engine.stamps().preview(image, size).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// `POST /api/stamp/place`
pub async fn place(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PlaceStampResponse>, ApiError> {
    let mut form = StampForm::read(multipart, state.config.server.max_upload_bytes).await?;
    let image = form.take_image()?;
    let request = StampRequest {
        wallet: form.text("wallet"),
        x: form.coordinate("x")?,
        y: form.coordinate("y")?,
        size: form.size()?,
        image,
        payment_ref: form.text("txSignature"),
    };
    info!(wallet = %request.wallet, x = request.x, y = request.y, size = request.size, "Stamp request");
    let stamp = state.engine.stamps().place(request).await?;
    Ok(Json(PlaceStampResponse {
        success: true,
        stamp,
    }))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use image::{ImageFormat, Rgb, RgbImage};
    use neonmap_types::palette;
    use tower::ServiceExt;

    use crate::test_support::{read_json, test_app};

    const BOUNDARY: &str = "neonmap-test-boundary";

    fn solid_png(size: u32, color: u8) -> Vec<u8> {
        let [r, g, b] = palette::rgb(color).map(|c| [c.0, c.1, c.2]).unwrap_or([0, 0, 0]);
        let img = RgbImage::from_pixel(size, size, Rgb([r, g, b]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("encode");
        out.into_inner()
    }

    fn multipart(uri: &str, image: Option<(&str, Vec<u8>)>, fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((content_type, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"stamp\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(&bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .expect("request")
    }

    #[tokio::test]
    async fn test_pricing() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/stamp/pricing").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let body = read_json(response).await;
        assert_eq!(body["prices"]["64"], 300);
        assert_eq!(body["sizes"], serde_json::json!([32, 64, 128]));
    }

    #[tokio::test]
    async fn test_preview_returns_palette_png() {
        let (app, _) = test_app().await;
        let request = multipart(
            "/api/stamp/preview",
            Some(("image/png", solid_png(32, 7))),
            &[("size", "32")],
        );
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let decoded = image::load_from_memory(&bytes).expect("png").to_rgb8();
        assert_eq!(decoded.dimensions(), (32, 32));
        let expected = palette::rgb(7).expect("palette color");
        assert_eq!(decoded.get_pixel(31, 31).0, [expected.0, expected.1, expected.2]);
    }

    #[tokio::test]
    async fn test_place_stamp_writes_canvas() {
        let (app, _) = test_app().await;
        let request = multipart(
            "/api/stamp/place",
            Some(("image/png", solid_png(32, 12))),
            &[("wallet", "w1"), ("x", "40"), ("y", "40"), ("size", "32"), ("txSignature", "sig1")],
        );
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["stamp"]["x"], 32);
        assert_eq!(body["stamp"]["width"], 32);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/canvas/chunk/0/0").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(bytes[32 * 64 + 32], 12);
        assert_eq!(bytes[63 * 64 + 63], 12);
        assert_eq!(bytes[31 * 64 + 31], 0);

        // Same signature again.
        let replay = multipart(
            "/api/stamp/place",
            Some(("image/png", solid_png(32, 12))),
            &[("wallet", "w1"), ("x", "0"), ("y", "0"), ("size", "32"), ("txSignature", "sig1")],
        );
        let response = app.oneshot(replay).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let (app, _) = test_app().await;

        let no_image = multipart("/api/stamp/preview", None, &[("size", "32")]);
        let response = app.clone().oneshot(no_image).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["error"], "No image provided");

        let gif = multipart("/api/stamp/preview", Some(("image/gif", vec![1, 2, 3])), &[]);
        let response = app.clone().oneshot(gif).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bad_size = multipart(
            "/api/stamp/preview",
            Some(("image/png", solid_png(8, 1))),
            &[("size", "48")],
        );
        let response = app.clone().oneshot(bad_size).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let garbage = multipart("/api/stamp/preview", Some(("image/png", vec![0; 64])), &[]);
        let response = app.clone().oneshot(garbage).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let too_big = multipart(
            "/api/stamp/preview",
            Some(("image/png", vec![0; 8 * 1024])),
            &[],
        );
        let response = app.oneshot(too_big).await.expect("response");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
