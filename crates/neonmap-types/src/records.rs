//! Wallet state and append-only audit records.

use serde::{Deserialize, Serialize};

use crate::TimestampMs;

/// Per-wallet row, created lazily on first interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub wallet: String,
    pub twitter: Option<String>,
    pub last_pixel_at: Option<TimestampMs>,
    pub last_stamp_at: Option<TimestampMs>,
    pub created_at: TimestampMs,
}

impl WalletState {
    /// Earliest instant the wallet may place a pixel again.
    ///
    /// Never earlier than `now`.
    pub fn next_placement_at(&self, cooldown_ms: u64, now: TimestampMs) -> TimestampMs {
        match self.last_pixel_at {
            Some(last) => now.max(last.saturating_add(cooldown_ms)),
            None => now,
        }
    }
}

/// One accepted pixel write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRecord {
    pub wallet: String,
    pub x: u32,
    pub y: u32,
    pub color: u8,
    pub timestamp: TimestampMs,
}

/// Outcome of the chunk merges of one stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StampStatus {
    Complete,
    Partial,
}

impl StampStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StampStatus::Complete => "complete",
            StampStatus::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "complete" => Some(StampStatus::Complete),
            "partial" => Some(StampStatus::Partial),
            _ => None,
        }
    }
}

/// One composited stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampRecord {
    pub wallet: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub payment_ref: String,
    pub status: StampStatus,
    pub chunks_applied: u32,
    pub timestamp: TimestampMs,
}

/// What a payment was spent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Stamp,
    Shield,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Stamp => "stamp",
            PaymentKind::Shield => "shield",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stamp" => Some(PaymentKind::Stamp),
            "shield" => Some(PaymentKind::Shield),
            _ => None,
        }
    }
}

/// A consumed, externally verified payment. The signature is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub signature: String,
    pub wallet: String,
    pub kind: PaymentKind,
    pub amount: u64,
    pub timestamp: TimestampMs,
}
