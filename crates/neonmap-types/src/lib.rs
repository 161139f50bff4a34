//! # neonmap-types
//!
//! Shared domain types used across the NeonMap workspace: canvas geometry,
//! the fixed palette, shields, audit records and real-time events.
//!
//! All timestamps are Unix epoch milliseconds (u64).

pub mod events;
pub mod geometry;
pub mod palette;
pub mod records;
pub mod shield;

pub use events::{CanvasEvent, EventEnvelope, PixelEvent, ShieldEvent, StampEvent};
pub use geometry::{CanvasGeometry, ChunkCoord, GeometryError, PixelAddress, Region};
pub use palette::{Rgb, PALETTE, PALETTE_SIZE};
pub use records::{PaymentKind, PaymentRecord, PlacementRecord, StampRecord, StampStatus, WalletState};
pub use shield::Shield;

/// Unix timestamp in milliseconds.
pub type TimestampMs = u64;

/// Longest wallet address accepted at the boundary.
pub const MAX_WALLET_LEN: usize = 44;

/// Longest transaction signature accepted at the boundary.
pub const MAX_SIGNATURE_LEN: usize = 88;

/// Milliseconds per second.
pub const MS_PER_SEC: u64 = 1_000;

/// Milliseconds per day.
pub const MS_PER_DAY: u64 = 24 * 60 * 60 * MS_PER_SEC;
