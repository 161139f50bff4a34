//! Shield: a time-bounded exclusive claim over a square region.

use serde::{Deserialize, Serialize};

use crate::{Region, TimestampMs};

/// A shield row. Never updated or deleted; inert once expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shield {
    pub id: String,
    pub owner: String,
    pub x0: u32,
    pub y0: u32,
    pub size: u32,
    pub expires_at: TimestampMs,
    pub created_at: TimestampMs,
}

impl Shield {
    /// The protected region.
    pub fn region(&self) -> Region {
        Region {
            x0: self.x0,
            y0: self.y0,
            size: self.size,
        }
    }

    /// A shield is active strictly before its expiry instant.
    pub fn is_active(&self, now: TimestampMs) -> bool {
        self.expires_at > now
    }

    /// Whether this shield protects `(x, y)` at `now`.
    pub fn protects(&self, x: u32, y: u32, now: TimestampMs) -> bool {
        self.is_active(now) && self.region().covers(x, y)
    }
}
