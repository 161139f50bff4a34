//! Single pixel placement.
//!
//! A wallet is either idle or cooling down until `last_pixel_at + cooldown`.
//! Rule violations are reported in a fixed order (input, cooldown, shield)
//! and always before anything is written. The cooldown slot itself is taken
//! with an atomic compare-and-set, so concurrent requests from one wallet
//! cannot both pass.
//!
//! The shield check and the write happen under a lease on the pixel's chunk.
//! Shield grants lease the same chunks, so a shield can never appear between
//! the check and the write.

use std::sync::Arc;

use neonmap_types::{palette, CanvasEvent, PixelEvent, PlacementRecord, WalletState};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::broadcast::EventBroadcaster;
use crate::chunk_store::ChunkStore;
use crate::clock::Clock;
use crate::store::{CanvasStore, CooldownClaim};
use crate::{validate_wallet, CanvasError, Result};

/// Successful placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementOutcome {
    pub pixel: PlacementRecord,
    /// Earliest instant the wallet may place again.
    pub next_pixel_at: u64,
}

/// Cooldown state of one wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownStatus {
    pub can_place: bool,
    /// Whole seconds remaining, rounded up.
    pub cooldown_remaining: u64,
    pub next_pixel_at: u64,
}

pub struct PlacementArbitrator<S> {
    store: Arc<S>,
    chunks: Arc<ChunkStore<S>>,
    events: EventBroadcaster,
    clock: Arc<dyn Clock>,
    cooldown_ms: u64,
}

fn remaining_secs(next_at: u64, now: u64) -> u64 {
    next_at.saturating_sub(now).div_ceil(1_000)
}

fn cooldown_error(last_pixel_at: u64, cooldown_ms: u64, now: u64) -> CanvasError {
    let next_placement_at = last_pixel_at.saturating_add(cooldown_ms);
    CanvasError::CooldownActive {
        remaining_secs: remaining_secs(next_placement_at, now),
        next_placement_at,
    }
}

impl<S: CanvasStore> PlacementArbitrator<S> {
    pub fn new(
        store: Arc<S>,
        chunks: Arc<ChunkStore<S>>,
        events: EventBroadcaster,
        clock: Arc<dyn Clock>,
        cooldown_ms: u64,
    ) -> Self {
        Self {
            store,
            chunks,
            events,
            clock,
            cooldown_ms,
        }
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    /// Validate and commit one pixel write.
    pub async fn place(&self, wallet: &str, x: i64, y: i64, color: i64) -> Result<PlacementOutcome> {
        validate_wallet(wallet)?;
        let address = self
            .chunks
            .geometry()
            .address(x, y)
            .map_err(|e| CanvasError::InvalidInput(e.to_string()))?;
        if !palette::is_valid(color) {
            return Err(CanvasError::InvalidInput(format!(
                "color must be between 0 and {}",
                palette::PALETTE_SIZE - 1
            )));
        }
        // Bounds were checked above, so these narrow losslessly.
        let (x, y, color) = (x as u32, y as u32, color as u8);
        let now = self.clock.now_ms();

        // Read-only peek so a cooling wallet gets CooldownActive even when the
        // pixel is also shielded.
        if let Some(last) = self.store.wallet(wallet).await?.and_then(|w| w.last_pixel_at) {
            if last.saturating_add(self.cooldown_ms) > now {
                return Err(cooldown_error(last, self.cooldown_ms, now));
            }
        }

        let mut lease = self.chunks.lease([address.chunk]).await?;
        if let Some(shield) = self.store.shield_covering(x, y, now).await? {
            if shield.owner != wallet {
                debug!(wallet, x, y, shield = %shield.id, "Placement blocked by shield");
                return Err(CanvasError::RegionProtected {
                    shield_id: shield.id,
                    owner: shield.owner,
                });
            }
        }

        let previous = match self.store.claim_cooldown(wallet, now, self.cooldown_ms).await? {
            CooldownClaim::Claimed { previous } => previous,
            CooldownClaim::Blocked { last_pixel_at } => {
                return Err(cooldown_error(last_pixel_at, self.cooldown_ms, now));
            }
        };

        if let Err(e) = lease.write_byte(address.chunk, address.offset, color).await {
            if let Err(release) = self.store.release_cooldown(wallet, now, previous).await {
                warn!(wallet, error = %release, "Cooldown release failed");
            }
            return Err(e);
        }

        let record = PlacementRecord {
            wallet: wallet.to_string(),
            x,
            y,
            color,
            timestamp: now,
        };
        // The pixel is already durable; a lost audit row must not undo it.
        if let Err(e) = self.store.append_placement(&record).await {
            error!(wallet, x, y, error = %e, "Failed to append placement record");
        }

        self.events.publish(
            CanvasEvent::Pixel(PixelEvent {
                x,
                y,
                color,
                wallet: wallet.to_string(),
                timestamp: now,
            }),
            now,
        );
        drop(lease);
        info!(wallet, x, y, color, "Pixel placed");

        Ok(PlacementOutcome {
            pixel: record,
            next_pixel_at: now.saturating_add(self.cooldown_ms),
        })
    }

    /// Current cooldown of `wallet`. Unknown wallets can place immediately.
    pub async fn cooldown(&self, wallet: &str) -> Result<CooldownStatus> {
        validate_wallet(wallet)?;
        let now = self.clock.now_ms();
        let next_pixel_at = match self.store.wallet(wallet).await? {
            Some(state) => state.next_placement_at(self.cooldown_ms, now),
            None => now,
        };
        Ok(CooldownStatus {
            can_place: next_pixel_at <= now,
            cooldown_remaining: remaining_secs(next_pixel_at, now),
            next_pixel_at,
        })
    }

    /// Fetch the wallet row, creating it on first contact.
    pub async fn profile(&self, wallet: &str) -> Result<(WalletState, u64)> {
        validate_wallet(wallet)?;
        let now = self.clock.now_ms();
        let state = self.store.ensure_wallet(wallet, now).await?;
        let next = state.next_placement_at(self.cooldown_ms, now);
        Ok((state, next))
    }
}
