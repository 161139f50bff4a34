//! Stamps: paid placement of a palette-quantized image.
//!
//! The image is decoded and quantized before payment is verified, so an
//! unusable upload never consumes a payment. Verification can take seconds,
//! so shields are checked twice: once up front, and again after leasing every
//! affected chunk, in the transaction that consumes the payment. A shield
//! granted while the payment was being verified therefore still wins.
//!
//! Under the lease the edits are merged chunk by chunk; a chunk that still
//! fails after retries is reported through
//! [`CanvasError::PartiallyApplied`] instead of being silently dropped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder};
use neonmap_types::{
    palette, CanvasEvent, CanvasGeometry, ChunkCoord, PaymentKind, PaymentRecord, Region, StampEvent,
    StampRecord, StampStatus,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::broadcast::EventBroadcaster;
use crate::chunk_store::{ChunkLease, ChunkStore};
use crate::clock::Clock;
use crate::payment::{verify_within, PaymentVerifierBoxed};
use crate::store::{CanvasStore, StampPayment};
use crate::{validate_signature, validate_wallet, CanvasError, Result};

/// Attempts per chunk merge before the chunk is reported as failed.
const MERGE_ATTEMPTS: u32 = 3;
const MERGE_BACKOFF: Duration = Duration::from_millis(25);

/// A square image reduced to palette indices, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedImage {
    pub size: u32,
    pub indices: Vec<u8>,
}

impl QuantizedImage {
    /// Index at local `(x, y)`.
    pub fn at(&self, x: u32, y: u32) -> u8 {
        self.indices[(y * self.size + x) as usize]
    }
}

/// Cover-fit `bytes` to `size × size` (centre crop), drop alpha and map each
/// pixel to its nearest palette entry.
pub fn quantize(bytes: &[u8], size: u32) -> Result<QuantizedImage> {
    let img = image::load_from_memory(bytes).map_err(|e| CanvasError::InvalidImage(e.to_string()))?;
    let img = if img.width() == size && img.height() == size {
        img
    } else {
        img.resize_to_fill(size, size, FilterType::Lanczos3)
    };
    let indices = img
        .to_rgb8()
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            palette::nearest(r, g, b)
        })
        .collect();
    Ok(QuantizedImage { size, indices })
}

/// Render quantized indices back to a PNG using palette colors.
pub fn render_png(image: &QuantizedImage) -> Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(image.indices.len() * 3);
    for &index in &image.indices {
        let c = palette::rgb(index)
            .ok_or_else(|| CanvasError::Internal(format!("palette index {index} out of range")))?;
        raw.extend_from_slice(&[c.0, c.1, c.2]);
    }
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&raw, image.size, image.size, ExtendedColorType::Rgb8)
        .map_err(|e| CanvasError::Internal(format!("png encode: {e}")))?;
    Ok(out)
}

/// A paid stamp request.
#[derive(Debug, Clone)]
pub struct StampRequest {
    pub wallet: String,
    pub x: i64,
    pub y: i64,
    pub size: u32,
    pub image: Vec<u8>,
    pub payment_ref: String,
}

/// A fully applied stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StampOutcome {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub chunks_applied: u32,
    pub timestamp: u64,
}

pub struct StampCompositor<S> {
    store: Arc<S>,
    chunks: Arc<ChunkStore<S>>,
    events: EventBroadcaster,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn PaymentVerifierBoxed>,
    prices: BTreeMap<u32, u64>,
    verify_timeout: Duration,
}

/// Local pixels of a stamp grouped into per-chunk edit sets.
fn chunk_edits(
    geometry: &CanvasGeometry,
    region: &Region,
    image: &QuantizedImage,
) -> Result<BTreeMap<ChunkCoord, BTreeMap<usize, u8>>> {
    let mut grouped: BTreeMap<ChunkCoord, BTreeMap<usize, u8>> = BTreeMap::new();
    for ly in 0..image.size {
        for lx in 0..image.size {
            let gx = i64::from(region.x0) + i64::from(lx);
            let gy = i64::from(region.y0) + i64::from(ly);
            let address = geometry
                .address(gx, gy)
                .map_err(|e| CanvasError::OutOfBounds(e.to_string()))?;
            grouped
                .entry(address.chunk)
                .or_default()
                .insert(address.offset, image.at(lx, ly));
        }
    }
    Ok(grouped)
}

impl<S: CanvasStore> StampCompositor<S> {
    pub fn new(
        store: Arc<S>,
        chunks: Arc<ChunkStore<S>>,
        events: EventBroadcaster,
        clock: Arc<dyn Clock>,
        verifier: Arc<dyn PaymentVerifierBoxed>,
        prices: BTreeMap<u32, u64>,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            chunks,
            events,
            clock,
            verifier,
            prices,
            verify_timeout,
        }
    }

    /// Size → price table.
    pub fn prices(&self) -> &BTreeMap<u32, u64> {
        &self.prices
    }

    pub fn quote(&self, size: u32) -> Result<u64> {
        self.prices.get(&size).copied().ok_or(CanvasError::InvalidSize(size))
    }

    /// Quantize off the async runtime.
    async fn quantize_blocking(&self, image: Vec<u8>, size: u32) -> Result<QuantizedImage> {
        tokio::task::spawn_blocking(move || quantize(&image, size))
            .await
            .map_err(|e| CanvasError::Internal(format!("quantize task: {e}")))?
    }

    /// Quantize an upload and render it as a palette-only PNG.
    pub async fn preview(&self, image: Vec<u8>, size: u32) -> Result<Vec<u8>> {
        self.quote(size)?;
        let quantized = self.quantize_blocking(image, size).await?;
        render_png(&quantized)
    }

    /// Verify payment and composite the stamp onto the canvas.
    pub async fn place(&self, req: StampRequest) -> Result<StampOutcome> {
        validate_wallet(&req.wallet)?;
        validate_signature(&req.payment_ref)?;
        let price = self.quote(req.size)?;

        let geometry = self.chunks.geometry();
        let region = Region::snap(req.x, req.y, req.size)
            .map_err(|e| CanvasError::OutOfBounds(e.to_string()))?;
        if !geometry.fits(&region) {
            return Err(CanvasError::OutOfBounds(format!(
                "stamp at ({}, {}) exits the canvas",
                region.x0, region.y0
            )));
        }

        let now = self.clock.now_ms();
        let blocking = self
            .store
            .active_shields(now)
            .await?
            .into_iter()
            .find(|s| s.owner != req.wallet && s.region().overlaps(&region));
        if let Some(shield) = blocking {
            return Err(CanvasError::RegionProtected {
                shield_id: shield.id,
                owner: shield.owner,
            });
        }

        let quantized = self.quantize_blocking(req.image, req.size).await?;
        let edits = chunk_edits(&geometry, &region, &quantized)?;

        if self.store.payment_exists(&req.payment_ref).await? {
            return Err(CanvasError::PaymentAlreadyUsed);
        }
        let paid = verify_within(
            self.verifier.as_ref(),
            &req.payment_ref,
            &req.wallet,
            price,
            self.verify_timeout,
        )
        .await
        .map_err(|e| {
            warn!(wallet = %req.wallet, signature = %req.payment_ref, error = %e, "Stamp payment rejected");
            CanvasError::PaymentInvalid(e.to_string())
        })?;

        let now = self.clock.now_ms();
        let payment = PaymentRecord {
            signature: req.payment_ref.clone(),
            wallet: req.wallet.clone(),
            kind: PaymentKind::Stamp,
            amount: paid.amount,
            timestamp: now,
        };
        let mut lease = self.chunks.lease(edits.keys().copied()).await?;
        match self.store.record_stamp_payment(&payment, region, now).await? {
            StampPayment::Recorded => {}
            StampPayment::PaymentReused => return Err(CanvasError::PaymentAlreadyUsed),
            StampPayment::Protected { shield_id, owner } => {
                warn!(wallet = %req.wallet, shield = %shield_id, "Stamp blocked by shield granted during verification");
                return Err(CanvasError::RegionProtected { shield_id, owner });
            }
        }

        let mut applied = Vec::new();
        let mut failed = Vec::new();
        for (chunk, set) in &edits {
            if Self::merge_with_retry(&mut lease, *chunk, set).await {
                applied.push(*chunk);
            } else {
                failed.push(*chunk);
            }
        }

        let status = if failed.is_empty() {
            StampStatus::Complete
        } else {
            StampStatus::Partial
        };
        let record = StampRecord {
            wallet: req.wallet.clone(),
            x: region.x0,
            y: region.y0,
            width: region.size,
            height: region.size,
            payment_ref: req.payment_ref.clone(),
            status,
            chunks_applied: applied.len() as u32,
            timestamp: now,
        };
        if let Err(e) = self.store.append_stamp(&record).await {
            error!(wallet = %req.wallet, signature = %req.payment_ref, error = %e, "Failed to append stamp record");
        }

        if !applied.is_empty() {
            self.events.publish(
                CanvasEvent::Stamp(StampEvent {
                    wallet: req.wallet.clone(),
                    x: region.x0,
                    y: region.y0,
                    width: region.size,
                    height: region.size,
                    partial: !failed.is_empty(),
                    timestamp: now,
                }),
                now,
            );
        }

        if !failed.is_empty() {
            error!(
                wallet = %req.wallet,
                signature = %req.payment_ref,
                applied = applied.len(),
                failed = failed.len(),
                "Stamp partially applied"
            );
            return Err(CanvasError::PartiallyApplied { applied, failed });
        }

        info!(wallet = %req.wallet, x = region.x0, y = region.y0, size = region.size, "Stamp placed");
        Ok(StampOutcome {
            x: region.x0,
            y: region.y0,
            width: region.size,
            height: region.size,
            chunks_applied: record.chunks_applied,
            timestamp: now,
        })
    }

    async fn merge_with_retry(
        lease: &mut ChunkLease<'_, S>,
        chunk: ChunkCoord,
        edits: &BTreeMap<usize, u8>,
    ) -> bool {
        for attempt in 1..=MERGE_ATTEMPTS {
            match lease.merge(chunk, edits).await {
                Ok(()) => return true,
                Err(e) => {
                    debug!(cx = chunk.cx, cy = chunk.cy, attempt, error = %e, "Chunk merge failed");
                    if attempt < MERGE_ATTEMPTS {
                        tokio::time::sleep(MERGE_BACKOFF * attempt).await;
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::payment::tests::ScriptedVerifier;
    use crate::payment::{PaymentError, PaymentVerifier, VerifiedPayment};
    use crate::store::tests::FlakyStore;
    use crate::store::SqliteStore;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use neonmap_types::{PaymentRecord, Shield, PALETTE};

    fn png(img: &RgbImage) -> Vec<u8> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
            .expect("encode");
        out
    }

    fn palette_image(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            let c = PALETTE[((x + y) % 32) as usize];
            Rgb([c.0, c.1, c.2])
        })
    }

    /// Grants alice a shield over the top-left cell while the stamp payment
    /// is still being verified.
    struct ShieldGrantingVerifier {
        store: Arc<SqliteStore>,
    }

    impl PaymentVerifier for ShieldGrantingVerifier {
        async fn verify(
            &self,
            _signature: String,
            _payer: String,
            min_amount: u64,
        ) -> std::result::Result<VerifiedPayment, PaymentError> {
            let payment = PaymentRecord {
                signature: "aliceShieldSig".into(),
                wallet: "alice".into(),
                kind: PaymentKind::Shield,
                amount: 50,
                timestamp: 5_000,
            };
            let shield = Shield {
                id: "late".into(),
                owner: "alice".into(),
                x0: 0,
                y0: 0,
                size: 64,
                expires_at: 1_000_000,
                created_at: 5_000,
            };
            self.store
                .grant_shield(&payment, &shield, 5_000)
                .await
                .map_err(|e| PaymentError::Rpc(e.to_string()))?;
            Ok(VerifiedPayment { amount: min_amount })
        }
    }

    fn compositor_with<S: CanvasStore, V: PaymentVerifier + 'static>(
        store: Arc<S>,
        verifier: V,
    ) -> (StampCompositor<S>, Arc<ChunkStore<S>>, EventBroadcaster) {
        let clock = Arc::new(ManualClock::new(5_000));
        // Chunk edge 32 so a 64 stamp spans four chunks.
        let geometry = CanvasGeometry::new(128, 128, 32).expect("geometry");
        let chunks = Arc::new(ChunkStore::new(Arc::clone(&store), clock.clone(), geometry));
        let events = EventBroadcaster::new(16);
        let compositor = StampCompositor::new(
            store,
            Arc::clone(&chunks),
            events.clone(),
            clock,
            Arc::new(verifier),
            BTreeMap::from([(32, 100), (64, 300)]),
            Duration::from_secs(5),
        );
        (compositor, chunks, events)
    }

    fn request(x: i64, y: i64, size: u32, image: Vec<u8>, sig: &str) -> StampRequest {
        StampRequest {
            wallet: "w1".into(),
            x,
            y,
            size,
            image,
            payment_ref: sig.into(),
        }
    }

    #[test]
    fn test_palette_exact_image_is_identity() {
        let q = quantize(&png(&palette_image(32)), 32).expect("quantize");
        for y in 0..32 {
            for x in 0..32 {
                assert_eq!(u32::from(q.at(x, y)), (x + y) % 32);
            }
        }
        // Quantizing the rendered preview again changes nothing.
        let again = quantize(&render_png(&q).expect("render"), 32).expect("quantize");
        assert_eq!(again, q);
    }

    #[test]
    fn test_cover_fit_crops_centre_and_drops_alpha() {
        // 96×32 image: red | white | red. Cover-fit to 32 keeps the white centre.
        let img = RgbImage::from_fn(96, 32, |x, _| {
            if (32..64).contains(&x) {
                Rgb([255, 255, 255])
            } else {
                Rgb([255, 0, 64])
            }
        });
        let q = quantize(&png(&img), 32).expect("quantize");
        assert_eq!(q.at(16, 16), 1);

        let mut rgba = RgbaImage::from_pixel(32, 32, Rgba([0, 255, 0, 0]));
        rgba.put_pixel(0, 0, Rgba([255, 255, 255, 10]));
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(rgba.as_raw(), 32, 32, ExtendedColorType::Rgba8)
            .expect("encode");
        let q = quantize(&bytes, 32).expect("quantize");
        assert_eq!(q.at(0, 0), 1);
        assert_eq!(q.at(5, 5), 15);
    }

    #[test]
    fn test_invalid_image() {
        assert!(matches!(
            quantize(b"not an image", 32),
            Err(CanvasError::InvalidImage(_))
        ));
    }

    #[tokio::test]
    async fn test_place_spanning_chunks() {
        let store = Arc::new(SqliteStore::open_memory().expect("open"));
        let (compositor, chunks, events) = compositor_with(Arc::clone(&store), ScriptedVerifier::default());
        let mut rx = events.subscribe();

        let out = compositor
            .place(request(70, 10, 64, png(&palette_image(64)), "sig1"))
            .await
            .expect("place");
        assert_eq!((out.x, out.y, out.width, out.chunks_applied), (64, 0, 64, 4));

        // Local (5, 40) lands at global (69, 40): chunk (2, 1), offset 8*32+5.
        let data = chunks.get(ChunkCoord { cx: 2, cy: 1 }).await.expect("get");
        assert_eq!(u32::from(data[8 * 32 + 5]), (5 + 40) % 32);

        let msg = rx.try_recv().expect("event");
        assert!(msg.contains("\"type\":\"stamp\""));
        assert!(msg.contains("\"partial\":false"));
        assert!(store.payment_exists("sig1").await.expect("exists"));
    }

    #[tokio::test]
    async fn test_rejections_do_not_consume_payment() {
        let store = Arc::new(SqliteStore::open_memory().expect("open"));
        let (compositor, _, _) = compositor_with(Arc::clone(&store), ScriptedVerifier::default());

        assert!(matches!(
            compositor.place(request(0, 0, 48, png(&palette_image(48)), "sig1")).await,
            Err(CanvasError::InvalidSize(48))
        ));
        assert!(matches!(
            compositor.place(request(128, 0, 32, png(&palette_image(32)), "sig1")).await,
            Err(CanvasError::OutOfBounds(_))
        ));
        assert!(matches!(
            compositor.place(request(0, 0, 32, b"garbage".to_vec(), "sig1")).await,
            Err(CanvasError::InvalidImage(_))
        ));
        assert!(!store.payment_exists("sig1").await.expect("exists"));
    }

    #[tokio::test]
    async fn test_payment_rejected_or_reused() {
        let store = Arc::new(SqliteStore::open_memory().expect("open"));
        let (compositor, _, _) = compositor_with(
            Arc::clone(&store),
            ScriptedVerifier {
                reject: Some(PaymentError::NoTransfer),
                ..Default::default()
            },
        );
        assert!(matches!(
            compositor.place(request(0, 0, 32, png(&palette_image(32)), "sig1")).await,
            Err(CanvasError::PaymentInvalid(_))
        ));

        let (compositor, _, _) = compositor_with(Arc::clone(&store), ScriptedVerifier::default());
        compositor
            .place(request(0, 0, 32, png(&palette_image(32)), "sig2"))
            .await
            .expect("place");
        assert!(matches!(
            compositor.place(request(32, 0, 32, png(&palette_image(32)), "sig2")).await,
            Err(CanvasError::PaymentAlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn test_foreign_shield_blocks_stamp() {
        let store = Arc::new(SqliteStore::open_memory().expect("open"));
        let payment = PaymentRecord {
            signature: "shield-sig".into(),
            wallet: "alice".into(),
            kind: PaymentKind::Shield,
            amount: 50,
            timestamp: 0,
        };
        let shield = Shield {
            id: "s1".into(),
            owner: "alice".into(),
            x0: 64,
            y0: 64,
            size: 64,
            expires_at: 1_000_000,
            created_at: 0,
        };
        store.grant_shield(&payment, &shield, 0).await.expect("grant");
        let (compositor, _, _) = compositor_with(Arc::clone(&store), ScriptedVerifier::default());

        assert!(matches!(
            compositor.place(request(64, 64, 64, png(&palette_image(64)), "sig1")).await,
            Err(CanvasError::RegionProtected { .. })
        ));
        compositor
            .place(request(0, 0, 64, png(&palette_image(64)), "sig2"))
            .await
            .expect("disjoint region");
    }

    #[tokio::test]
    async fn test_shield_granted_during_verification_wins() {
        let store = Arc::new(SqliteStore::open_memory().expect("open"));
        let verifier = ShieldGrantingVerifier {
            store: Arc::clone(&store),
        };
        let (compositor, chunks, events) = compositor_with(Arc::clone(&store), verifier);
        let mut rx = events.subscribe();

        let err = compositor
            .place(request(0, 0, 32, png(&palette_image(32)), "sig1"))
            .await
            .expect_err("shield granted mid-verification");
        assert!(matches!(err, CanvasError::RegionProtected { ref owner, .. } if owner == "alice"));

        assert!(!store.payment_exists("sig1").await.expect("exists"));
        let data = chunks.get(ChunkCoord { cx: 0, cy: 0 }).await.expect("get");
        assert!(data.iter().all(|&b| b == 0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_application_is_reported() {
        let store = Arc::new(FlakyStore::new());
        store.fail(ChunkCoord { cx: 1, cy: 1 });
        let (compositor, chunks, events) = compositor_with(Arc::clone(&store), ScriptedVerifier::default());
        let mut rx = events.subscribe();

        let err = compositor
            .place(request(0, 0, 64, png(&palette_image(64)), "sig1"))
            .await
            .expect_err("partial");
        assert!(
            matches!(
                err,
                CanvasError::PartiallyApplied { ref applied, ref failed }
                    if applied.len() == 3 && failed.as_slice() == [ChunkCoord { cx: 1, cy: 1 }]
            ),
            "{err:?}"
        );

        // Applied chunks hold the image; the failed one is untouched.
        let ok = chunks.get(ChunkCoord { cx: 1, cy: 0 }).await.expect("get");
        assert_eq!(ok[1], 1);
        let untouched = chunks.get(ChunkCoord { cx: 1, cy: 1 }).await.expect("get");
        assert!(untouched.iter().all(|&b| b == 0));

        assert!(store.payment_exists("sig1").await.expect("exists"));
        let msg = rx.try_recv().expect("event");
        assert!(msg.contains("\"partial\":true"));
    }

    #[tokio::test]
    async fn test_preview_renders_palette_png() {
        let store = Arc::new(SqliteStore::open_memory().expect("open"));
        let (compositor, _, _) = compositor_with(store, ScriptedVerifier::default());
        let out = compositor
            .preview(png(&palette_image(32)), 32)
            .await
            .expect("preview");
        let decoded = image::load_from_memory(&out).expect("decode").to_rgb8();
        assert_eq!(decoded.dimensions(), (32, 32));
        let c = PALETTE[3];
        assert_eq!(decoded.get_pixel(1, 2), &Rgb([c.0, c.1, c.2]));

        assert!(matches!(
            compositor.preview(png(&palette_image(32)), 16).await,
            Err(CanvasError::InvalidSize(16))
        ));
    }
}
