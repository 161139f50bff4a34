//! Chunked raster storage.
//!
//! Each chunk has its own async mutex guarding a cached copy of its buffer.
//! Every mutation is a read-modify-write under that mutex, persisted before
//! the cache is updated, so concurrent writers to one chunk are serialized
//! and never lose each other's edits while writers to different chunks run
//! in parallel. A failed persist leaves both the cache and the store on the
//! previous version.
//!
//! A [`ChunkLease`] holds several chunk mutexes at once, always taken in
//! coordinate order. Callers that must check a rule and then write (shield
//! exclusivity) do both under one lease, and shield grants lease the chunks
//! under the new shield, so no write can slip in between the check and the
//! grant.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use neonmap_types::{palette, CanvasGeometry, ChunkCoord};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::store::CanvasStore;
use crate::{CanvasError, Result};

type Slot = Arc<Mutex<Option<Vec<u8>>>>;

pub struct ChunkStore<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    geometry: CanvasGeometry,
    slots: HashMap<ChunkCoord, Slot>,
}

impl<S: CanvasStore> ChunkStore<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, geometry: CanvasGeometry) -> Self {
        let slots = geometry
            .all_chunks()
            .map(|chunk| (chunk, Arc::new(Mutex::new(None))))
            .collect();
        Self {
            store,
            clock,
            geometry,
            slots,
        }
    }

    pub fn geometry(&self) -> CanvasGeometry {
        self.geometry
    }

    /// Create zeroed rows for every chunk missing from the store.
    pub async fn provision(&self) -> Result<usize> {
        let created = self
            .store
            .provision_chunks(self.geometry, self.clock.now_ms())
            .await?;
        debug!(created, "Chunk grid provisioned");
        Ok(created)
    }

    /// Validate a chunk coordinate supplied by a client.
    pub fn coord(&self, cx: i64, cy: i64) -> Result<ChunkCoord> {
        self.geometry
            .chunk(cx, cy)
            .map_err(|e| CanvasError::OutOfBounds(e.to_string()))
    }

    /// Raw bytes of one chunk, `C × C` palette indices in row-major order.
    ///
    /// A chunk that was never written reads as all zeros.
    pub async fn get(&self, chunk: ChunkCoord) -> Result<Vec<u8>> {
        let slot = self.slot(chunk)?;
        let mut cached = slot.lock().await;
        let data = self.loaded(chunk, &mut cached).await?;
        Ok(data.clone())
    }

    /// Set one byte.
    pub async fn write_byte(&self, chunk: ChunkCoord, offset: usize, value: u8) -> Result<()> {
        self.lease([chunk]).await?.write_byte(chunk, offset, value).await
    }

    /// Apply `offset → value` edits to one chunk as a single atomic update.
    pub async fn write_merge(&self, chunk: ChunkCoord, edits: &BTreeMap<usize, u8>) -> Result<()> {
        self.lease([chunk]).await?.merge(chunk, edits).await
    }

    /// Lock every chunk in `chunks` until the lease is dropped.
    pub async fn lease(&self, chunks: impl IntoIterator<Item = ChunkCoord>) -> Result<ChunkLease<'_, S>> {
        let ordered: BTreeSet<ChunkCoord> = chunks.into_iter().collect();
        let mut held = BTreeMap::new();
        for chunk in ordered {
            let slot = self.slot(chunk)?;
            held.insert(chunk, slot.lock().await);
        }
        Ok(ChunkLease { owner: self, held })
    }

    fn check_edits(&self, edits: &BTreeMap<usize, u8>) -> Result<()> {
        let len = self.geometry.chunk_len();
        for (&offset, &value) in edits {
            if offset >= len {
                return Err(CanvasError::InvalidInput(format!(
                    "offset {offset} outside chunk of {len} bytes"
                )));
            }
            if usize::from(value) >= palette::PALETTE_SIZE {
                return Err(CanvasError::InvalidInput(format!("color {value} outside palette")));
            }
        }
        Ok(())
    }

    fn slot(&self, chunk: ChunkCoord) -> Result<&Slot> {
        self.slots.get(&chunk).ok_or_else(|| {
            CanvasError::OutOfBounds(format!("chunk ({}, {}) is out of bounds", chunk.cx, chunk.cy))
        })
    }

    /// Fill the cache from the store on first access.
    async fn loaded<'a>(&self, chunk: ChunkCoord, cached: &'a mut Option<Vec<u8>>) -> Result<&'a Vec<u8>> {
        if cached.is_none() {
            let len = self.geometry.chunk_len();
            let data = match self.store.load_chunk(chunk).await? {
                Some(data) if data.len() == len => data,
                Some(data) => {
                    return Err(CanvasError::Internal(format!(
                        "chunk ({}, {}) holds {} bytes, expected {len}",
                        chunk.cx,
                        chunk.cy,
                        data.len()
                    )));
                }
                None => vec![0u8; len],
            };
            *cached = Some(data);
        }
        cached
            .as_ref()
            .ok_or_else(|| CanvasError::Internal("chunk cache not filled".into()))
    }
}

/// Exclusive hold over a set of chunks.
pub struct ChunkLease<'a, S> {
    owner: &'a ChunkStore<S>,
    held: BTreeMap<ChunkCoord, MutexGuard<'a, Option<Vec<u8>>>>,
}

impl<S: CanvasStore> ChunkLease<'_, S> {
    pub async fn write_byte(&mut self, chunk: ChunkCoord, offset: usize, value: u8) -> Result<()> {
        let mut edits = BTreeMap::new();
        edits.insert(offset, value);
        self.merge(chunk, &edits).await
    }

    /// Apply edits to a leased chunk, persisting before the cache moves.
    pub async fn merge(&mut self, chunk: ChunkCoord, edits: &BTreeMap<usize, u8>) -> Result<()> {
        let owner = self.owner;
        owner.check_edits(edits)?;
        let cached = self.held.get_mut(&chunk).ok_or_else(|| {
            CanvasError::Internal(format!("chunk ({}, {}) is not leased", chunk.cx, chunk.cy))
        })?;

        let mut next = owner.loaded(chunk, cached).await?.clone();
        for (&offset, &value) in edits {
            next[offset] = value;
        }

        if let Err(e) = owner.store.store_chunk(chunk, &next, owner.clock.now_ms()).await {
            warn!(cx = chunk.cx, cy = chunk.cy, error = %e, "Chunk persist failed");
            return Err(e.into());
        }
        **cached = Some(next);
        Ok(())
    }
}
