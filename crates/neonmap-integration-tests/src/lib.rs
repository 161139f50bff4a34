//! Integration test crate for the NeonMap canvas server.
//!
//! The library only holds shared fixtures; the scenarios in `tests/` drive
//! the engine and the HTTP surface end to end over real SQLite stores.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p neonmap-integration-tests
//! ```

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use neonmap_canvas::{
    CanvasEngine, EngineSettings, ManualClock, PaymentError, PaymentVerifier, SqliteStore,
    VerifiedPayment,
};
use neonmap_types::{palette, CanvasGeometry};

/// Clock start shared by every fixture.
pub const START_MS: u64 = 1_700_000_000_000;

/// Payment verifier whose answers are scripted per signature.
///
/// Unscripted signatures pay exactly the requested amount.
#[derive(Debug, Default)]
pub struct ScriptedVerifier {
    rejections: Mutex<HashMap<String, PaymentError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    /// A verifier that answers only after `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make every verification of `signature` fail with `error`.
    pub fn reject(&self, signature: &str, error: PaymentError) {
        self.rejections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signature.to_string(), error);
    }

    /// Number of verifications attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentVerifier for ScriptedVerifier {
    async fn verify(
        &self,
        signature: String,
        _payer: String,
        min_amount: u64,
    ) -> Result<VerifiedPayment, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .rejections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signature)
            .cloned();
        match scripted {
            Some(error) => Err(error),
            None => Ok(VerifiedPayment { amount: min_amount }),
        }
    }
}

/// An engine over its own store, clock and scripted verifier.
pub struct Harness {
    pub engine: CanvasEngine<SqliteStore>,
    pub store: Arc<SqliteStore>,
    pub clock: Arc<ManualClock>,
    pub verifier: Arc<ScriptedVerifier>,
}

impl Harness {
    /// Default settings over an in-memory store.
    pub async fn new() -> Self {
        Self::with_settings(EngineSettings::default()).await
    }

    pub async fn with_settings(settings: EngineSettings) -> Self {
        let store = Arc::new(SqliteStore::open_memory().expect("open store"));
        Self::build(settings, store, Arc::new(ScriptedVerifier::default()), START_MS).await
    }

    /// Assemble and provision an engine over an existing store.
    pub async fn build(
        settings: EngineSettings,
        store: Arc<SqliteStore>,
        verifier: Arc<ScriptedVerifier>,
        start_ms: u64,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start_ms));
        let engine = CanvasEngine::new(
            settings,
            Arc::clone(&store),
            Arc::clone(&verifier) as _,
            Arc::clone(&clock) as _,
        );
        engine.provision().await.expect("provision");
        Self {
            engine,
            store,
            clock,
            verifier,
        }
    }
}

/// Default settings on a smaller canvas.
pub fn settings_for(width: u32, height: u32, chunk_size: u32) -> EngineSettings {
    EngineSettings {
        geometry: CanvasGeometry::new(width, height, chunk_size).expect("geometry"),
        ..EngineSettings::default()
    }
}

/// PNG of a single palette color.
pub fn solid_png(size: u32, color: u8) -> Vec<u8> {
    palette_png(size, |_, _| color)
}

/// PNG whose pixel `(x, y)` is palette color `pick(x, y)`.
pub fn palette_png(size: u32, pick: impl Fn(u32, u32) -> u8) -> Vec<u8> {
    let img = RgbImage::from_fn(size, size, |x, y| {
        let c = palette::rgb(pick(x, y)).expect("palette index");
        Rgb([c.0, c.1, c.2])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

/// A fresh path for an on-disk database, removed when dropped.
pub struct TempDb {
    pub path: PathBuf,
}

impl TempDb {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("neonmap-it-{:016x}.db", rand::random::<u64>()));
        Self { path }
    }
}

impl Default for TempDb {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}
