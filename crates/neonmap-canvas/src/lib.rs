//! # neonmap-canvas
//!
//! The canvas state engine: chunked raster store, pixel placement
//! arbitration, shield lifecycle, stamp compositing and real-time event
//! fan-out.
//!
//! ## Modules
//!
//! - [`chunk_store`]: per-chunk serialized read-modify-write over the store
//! - [`arbitrator`]: single pixel placement with cooldown and shield checks
//! - [`shield`]: paid, time-bounded region protection
//! - [`compositor`]: image quantization and multi-chunk stamp commits
//! - [`payment`]: external payment verification capability
//! - [`broadcast`]: viewer fan-out
//! - [`store`]: persistence capability and its SQLite implementation
//! - [`engine`]: wires the components into one server context

pub mod arbitrator;
pub mod broadcast;
pub mod chunk_store;
pub mod clock;
pub mod compositor;
pub mod engine;
pub mod payment;
pub mod shield;
pub mod store;

pub use arbitrator::{CooldownStatus, PlacementArbitrator, PlacementOutcome};
pub use broadcast::EventBroadcaster;
pub use chunk_store::{ChunkLease, ChunkStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compositor::{QuantizedImage, StampCompositor, StampOutcome, StampRequest};
pub use engine::{CanvasEngine, EngineSettings};
pub use payment::{
    DevPaymentVerifier, PaymentError, PaymentVerifier, PaymentVerifierBoxed, RpcPaymentVerifier,
    VerifiedPayment,
};
pub use shield::{ShieldRegistry, ShieldRequest};
pub use store::{CanvasStore, CooldownClaim, ShieldGrant, SqliteStore, StampPayment, StoreError};

use neonmap_types::{ChunkCoord, MAX_SIGNATURE_LEN, MAX_WALLET_LEN};

/// Engine error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    /// Malformed or out-of-range request.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A chunk coordinate or region lies outside the canvas.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// The wallet placed a pixel too recently.
    #[error("cooldown active ({remaining_secs}s remaining)")]
    CooldownActive {
        /// Whole seconds until the wallet may place again, rounded up.
        remaining_secs: u64,
        /// Instant the wallet may place again.
        next_placement_at: u64,
    },

    /// The target lies inside another wallet's active shield.
    #[error("area is protected by shield {shield_id}")]
    RegionProtected { shield_id: String, owner: String },

    /// Shield duration not in the price table.
    #[error("invalid shield duration: {0} days")]
    InvalidDuration(u32),

    /// The owner already holds an active shield.
    #[error("wallet already has an active shield ({shield_id})")]
    DuplicateShield { shield_id: String },

    /// The region intersects an active shield.
    #[error("area overlaps existing shield {shield_id}")]
    RegionOverlap { shield_id: String },

    /// The external verifier rejected the payment.
    #[error("payment invalid: {0}")]
    PaymentInvalid(String),

    /// The transaction signature was already consumed.
    #[error("transaction already used")]
    PaymentAlreadyUsed,

    /// The uploaded image could not be decoded.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Stamp size not in the price table.
    #[error("invalid stamp size: {0}")]
    InvalidSize(u32),

    /// Some chunk merges of a paid stamp failed after retries.
    #[error("stamp partially applied: {} chunks written, {} failed", applied.len(), failed.len())]
    PartiallyApplied {
        applied: Vec<ChunkCoord>,
        failed: Vec<ChunkCoord>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, CanvasError>;

/// Boundary check for wallet addresses.
pub(crate) fn validate_wallet(wallet: &str) -> Result<()> {
    if wallet.is_empty() || wallet.len() > MAX_WALLET_LEN {
        return Err(CanvasError::InvalidInput("valid wallet address required".into()));
    }
    if !wallet.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CanvasError::InvalidInput("wallet address must be alphanumeric".into()));
    }
    Ok(())
}

/// Boundary check for transaction signatures.
pub(crate) fn validate_signature(signature: &str) -> Result<()> {
    if signature.is_empty() || signature.len() > MAX_SIGNATURE_LEN {
        return Err(CanvasError::InvalidInput("transaction signature required".into()));
    }
    if !signature.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CanvasError::InvalidInput("transaction signature must be alphanumeric".into()));
    }
    Ok(())
}
