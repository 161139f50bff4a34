//! Shields: paid, time-bounded exclusive claims over `S × S` grid cells.
//!
//! Expiry is lazy. A shield is active while `expires_at > now` and simply
//! stops matching queries afterwards; rows are never swept.
//!
//! The grant runs under a lease on every chunk the shield covers, so a pixel
//! or stamp that already passed its shield check finishes writing before the
//! shield exists, and any later one sees it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use neonmap_types::{CanvasEvent, PaymentKind, PaymentRecord, Region, Shield, MS_PER_DAY};
use rand::RngCore;
use tracing::{info, warn};

use crate::broadcast::EventBroadcaster;
use crate::chunk_store::ChunkStore;
use crate::clock::Clock;
use crate::payment::{verify_within, PaymentVerifierBoxed};
use crate::store::{CanvasStore, ShieldGrant};
use crate::{validate_signature, validate_wallet, CanvasError, Result};

/// A paid shield request.
#[derive(Debug, Clone)]
pub struct ShieldRequest {
    pub owner: String,
    pub x: i64,
    pub y: i64,
    pub duration_days: u32,
    pub payment_ref: String,
}

pub struct ShieldRegistry<S> {
    store: Arc<S>,
    chunks: Arc<ChunkStore<S>>,
    events: EventBroadcaster,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn PaymentVerifierBoxed>,
    size: u32,
    prices: BTreeMap<u32, u64>,
    verify_timeout: Duration,
}

fn new_shield_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl<S: CanvasStore> ShieldRegistry<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        chunks: Arc<ChunkStore<S>>,
        events: EventBroadcaster,
        clock: Arc<dyn Clock>,
        verifier: Arc<dyn PaymentVerifierBoxed>,
        size: u32,
        prices: BTreeMap<u32, u64>,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            chunks,
            events,
            clock,
            verifier,
            size,
            prices,
            verify_timeout,
        }
    }

    /// Edge length of every shield.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Duration (days) → price table.
    pub fn prices(&self) -> &BTreeMap<u32, u64> {
        &self.prices
    }

    pub fn quote(&self, duration_days: u32) -> Result<u64> {
        self.prices
            .get(&duration_days)
            .copied()
            .ok_or(CanvasError::InvalidDuration(duration_days))
    }

    /// The active shield covering `(x, y)`, if any.
    pub async fn is_protected(&self, x: i64, y: i64) -> Result<Option<Shield>> {
        if !self.chunks.geometry().contains(x, y) {
            return Err(CanvasError::InvalidInput(format!("coordinate ({x}, {y}) is out of bounds")));
        }
        Ok(self
            .store
            .shield_covering(x as u32, y as u32, self.clock.now_ms())
            .await?)
    }

    pub async fn active(&self) -> Result<Vec<Shield>> {
        Ok(self.store.active_shields(self.clock.now_ms()).await?)
    }

    pub async fn for_owner(&self, owner: &str) -> Result<Option<Shield>> {
        validate_wallet(owner)?;
        Ok(self.store.shield_for_owner(owner, self.clock.now_ms()).await?)
    }

    /// Verify payment and create a shield over the grid cell containing
    /// `(x, y)`.
    ///
    /// Owner and overlap checks run once before the (slow) payment check and
    /// again inside the grant transaction. The payment is consumed only if
    /// the shield is created.
    pub async fn create(&self, req: ShieldRequest) -> Result<Shield> {
        validate_wallet(&req.owner)?;
        validate_signature(&req.payment_ref)?;
        let price = self.quote(req.duration_days)?;

        let region = Region::snap(req.x, req.y, self.size)
            .map_err(|e| CanvasError::OutOfBounds(e.to_string()))?;
        let geometry = self.chunks.geometry();
        if !geometry.fits(&region) {
            return Err(CanvasError::OutOfBounds(format!(
                "shield at ({}, {}) exits the canvas",
                region.x0, region.y0
            )));
        }

        let now = self.clock.now_ms();
        if let Some(existing) = self.store.shield_for_owner(&req.owner, now).await? {
            return Err(CanvasError::DuplicateShield {
                shield_id: existing.id,
            });
        }
        if let Some(existing) = self.store.shield_overlapping(region, now).await? {
            return Err(CanvasError::RegionOverlap {
                shield_id: existing.id,
            });
        }
        if self.store.payment_exists(&req.payment_ref).await? {
            return Err(CanvasError::PaymentAlreadyUsed);
        }

        let paid = verify_within(
            self.verifier.as_ref(),
            &req.payment_ref,
            &req.owner,
            price,
            self.verify_timeout,
        )
        .await
        .map_err(|e| {
            warn!(owner = %req.owner, signature = %req.payment_ref, error = %e, "Shield payment rejected");
            CanvasError::PaymentInvalid(e.to_string())
        })?;

        // Verification may take seconds; expiry counts from the grant.
        let now = self.clock.now_ms();
        let shield = Shield {
            id: new_shield_id(),
            owner: req.owner.clone(),
            x0: region.x0,
            y0: region.y0,
            size: region.size,
            expires_at: now.saturating_add(u64::from(req.duration_days).saturating_mul(MS_PER_DAY)),
            created_at: now,
        };
        let payment = PaymentRecord {
            signature: req.payment_ref.clone(),
            wallet: req.owner.clone(),
            kind: PaymentKind::Shield,
            amount: paid.amount,
            timestamp: now,
        };

        let lease = self.chunks.lease(geometry.chunks_in(&region)).await?;
        match self.store.grant_shield(&payment, &shield, now).await? {
            ShieldGrant::Granted => {}
            ShieldGrant::PaymentReused => return Err(CanvasError::PaymentAlreadyUsed),
            ShieldGrant::OwnerHasActive { shield_id } => {
                return Err(CanvasError::DuplicateShield { shield_id });
            }
            ShieldGrant::Overlap { shield_id } => return Err(CanvasError::RegionOverlap { shield_id }),
        }

        info!(
            owner = %shield.owner,
            id = %shield.id,
            x0 = shield.x0,
            y0 = shield.y0,
            days = req.duration_days,
            "Shield created"
        );
        self.events.publish(CanvasEvent::Shield(shield.clone()), now);
        drop(lease);
        Ok(shield)
    }
}
