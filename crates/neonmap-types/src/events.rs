//! Real-time events pushed to connected viewers.
//!
//! On the wire every event is `{"type": ..., "data": ..., "timestamp": ...}`.
//! Stamp events only carry the bounding box; viewers re-fetch the affected
//! chunks to see exact content.

use serde::{Deserialize, Serialize};

use crate::{Shield, TimestampMs};

/// A single pixel was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelEvent {
    pub x: u32,
    pub y: u32,
    pub color: u8,
    pub wallet: String,
    pub timestamp: TimestampMs,
}

/// A stamp was composited over a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampEvent {
    pub wallet: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub partial: bool,
    pub timestamp: TimestampMs,
}

/// A shield was created.
pub type ShieldEvent = Shield;

/// Every event kind, adjacently tagged as `type` / `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CanvasEvent {
    Pixel(PixelEvent),
    Stamp(StampEvent),
    Shield(ShieldEvent),
}

impl CanvasEvent {
    /// Wire name of the event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            CanvasEvent::Pixel(_) => "pixel",
            CanvasEvent::Stamp(_) => "stamp",
            CanvasEvent::Shield(_) => "shield",
        }
    }
}

/// Event plus publication time, as serialized to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: CanvasEvent,
    pub timestamp: TimestampMs,
}
