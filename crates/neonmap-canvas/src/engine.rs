//! Server context: one instance of every engine component sharing a store,
//! clock, verifier and event hub.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use neonmap_types::{CanvasGeometry, MS_PER_SEC};

use crate::arbitrator::PlacementArbitrator;
use crate::broadcast::EventBroadcaster;
use crate::chunk_store::ChunkStore;
use crate::clock::Clock;
use crate::compositor::StampCompositor;
use crate::payment::PaymentVerifierBoxed;
use crate::shield::ShieldRegistry;
use crate::store::CanvasStore;
use crate::Result;

/// Tunables shared by the engine components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub geometry: CanvasGeometry,
    pub cooldown_secs: u64,
    pub shield_size: u32,
    /// Shield duration in days → price.
    pub shield_prices: BTreeMap<u32, u64>,
    /// Stamp edge → price.
    pub stamp_prices: BTreeMap<u32, u64>,
    pub verify_timeout: Duration,
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            geometry: CanvasGeometry {
                width: 2048,
                height: 2048,
                chunk_size: 256,
            },
            cooldown_secs: 60,
            shield_size: 64,
            shield_prices: BTreeMap::from([(1, 50), (3, 120), (7, 200), (30, 500)]),
            stamp_prices: BTreeMap::from([(32, 100), (64, 300), (128, 800)]),
            verify_timeout: Duration::from_secs(20),
            event_buffer: 1024,
        }
    }
}

/// The canvas state engine.
pub struct CanvasEngine<S> {
    settings: EngineSettings,
    chunks: Arc<ChunkStore<S>>,
    arbitrator: PlacementArbitrator<S>,
    shields: ShieldRegistry<S>,
    stamps: StampCompositor<S>,
    events: EventBroadcaster,
}

impl<S: CanvasStore> CanvasEngine<S> {
    pub fn new(
        settings: EngineSettings,
        store: Arc<S>,
        verifier: Arc<dyn PaymentVerifierBoxed>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = EventBroadcaster::new(settings.event_buffer);
        let chunks = Arc::new(ChunkStore::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            settings.geometry,
        ));
        let arbitrator = PlacementArbitrator::new(
            Arc::clone(&store),
            Arc::clone(&chunks),
            events.clone(),
            Arc::clone(&clock),
            settings.cooldown_secs.saturating_mul(MS_PER_SEC),
        );
        let shields = ShieldRegistry::new(
            Arc::clone(&store),
            Arc::clone(&chunks),
            events.clone(),
            Arc::clone(&clock),
            Arc::clone(&verifier),
            settings.shield_size,
            settings.shield_prices.clone(),
            settings.verify_timeout,
        );
        let stamps = StampCompositor::new(
            store,
            Arc::clone(&chunks),
            events.clone(),
            clock,
            verifier,
            settings.stamp_prices.clone(),
            settings.verify_timeout,
        );
        Self {
            settings,
            chunks,
            arbitrator,
            shields,
            stamps,
            events,
        }
    }

    /// Ensure every chunk row exists. Idempotent.
    pub async fn provision(&self) -> Result<usize> {
        self.chunks.provision().await
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn chunks(&self) -> &ChunkStore<S> {
        &self.chunks
    }

    pub fn arbitrator(&self) -> &PlacementArbitrator<S> {
        &self.arbitrator
    }

    pub fn shields(&self) -> &ShieldRegistry<S> {
        &self.shields
    }

    pub fn stamps(&self) -> &StampCompositor<S> {
        &self.stamps
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }
}
