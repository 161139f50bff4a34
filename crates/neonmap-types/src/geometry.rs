//! Canvas geometry: pixel coordinates, chunk addressing and square regions.
//!
//! A canvas of `width × height` pixels is tiled by square chunks of edge
//! `chunk_size`. Pixel `(x, y)` lives in chunk `(x / C, y / C)` at byte offset
//! `(y mod C) * C + (x mod C)`.

use serde::{Deserialize, Serialize};

/// Errors raised while building or addressing a canvas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// Dimensions are zero or not a multiple of the chunk edge.
    #[error("invalid canvas dimensions {width}x{height} for chunk size {chunk_size}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        chunk_size: u32,
    },

    /// A pixel or chunk coordinate lies outside the canvas.
    #[error("coordinate ({x}, {y}) is out of bounds")]
    OutOfBounds { x: i64, y: i64 },
}

/// Fixed canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasGeometry {
    pub width: u32,
    pub height: u32,
    pub chunk_size: u32,
}

/// Address of one chunk in the chunk grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub cx: u32,
    pub cy: u32,
}

/// A pixel resolved to its owning chunk and byte offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelAddress {
    pub chunk: ChunkCoord,
    pub offset: usize,
}

/// A square, grid-aligned region `[x0, x0 + size) × [y0, y0 + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x0: u32,
    pub y0: u32,
    pub size: u32,
}

impl CanvasGeometry {
    /// Build a geometry, checking that both dimensions are non-zero multiples
    /// of the chunk edge.
    pub fn new(width: u32, height: u32, chunk_size: u32) -> Result<Self, GeometryError> {
        let valid = chunk_size > 0
            && width > 0
            && height > 0
            && width % chunk_size == 0
            && height % chunk_size == 0;
        if !valid {
            return Err(GeometryError::InvalidDimensions {
                width,
                height,
                chunk_size,
            });
        }
        Ok(Self {
            width,
            height,
            chunk_size,
        })
    }

    /// Number of chunk columns.
    pub fn chunks_x(&self) -> u32 {
        self.width / self.chunk_size
    }

    /// Number of chunk rows.
    pub fn chunks_y(&self) -> u32 {
        self.height / self.chunk_size
    }

    /// Length in bytes of one chunk buffer.
    pub fn chunk_len(&self) -> usize {
        (self.chunk_size as usize) * (self.chunk_size as usize)
    }

    /// Whether `(x, y)` is a pixel of this canvas.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height)
    }

    /// Validate a chunk coordinate.
    pub fn chunk(&self, cx: i64, cy: i64) -> Result<ChunkCoord, GeometryError> {
        let in_range = cx >= 0
            && cy >= 0
            && cx < i64::from(self.chunks_x())
            && cy < i64::from(self.chunks_y());
        if !in_range {
            return Err(GeometryError::OutOfBounds { x: cx, y: cy });
        }
        Ok(ChunkCoord {
            cx: cx as u32,
            cy: cy as u32,
        })
    }

    /// Resolve a pixel to its chunk and offset.
    pub fn address(&self, x: i64, y: i64) -> Result<PixelAddress, GeometryError> {
        if !self.contains(x, y) {
            return Err(GeometryError::OutOfBounds { x, y });
        }
        let c = self.chunk_size as usize;
        let (x, y) = (x as usize, y as usize);
        Ok(PixelAddress {
            chunk: ChunkCoord {
                cx: (x / c) as u32,
                cy: (y / c) as u32,
            },
            offset: (y % c) * c + (x % c),
        })
    }

    /// Iterate over every chunk coordinate, row by row.
    pub fn all_chunks(&self) -> impl Iterator<Item = ChunkCoord> {
        let (nx, ny) = (self.chunks_x(), self.chunks_y());
        (0..ny).flat_map(move |cy| (0..nx).map(move |cx| ChunkCoord { cx, cy }))
    }

    /// Chunks intersecting `region`, clipped to the canvas.
    pub fn chunks_in(&self, region: &Region) -> impl Iterator<Item = ChunkCoord> {
        let c = self.chunk_size;
        let last = |origin: u32, count: u32| {
            let end = u64::from(origin) + u64::from(region.size.max(1)) - 1;
            (end / u64::from(c)).min(u64::from(count.saturating_sub(1))) as u32
        };
        let (x_first, y_first) = (region.x0 / c, region.y0 / c);
        let (x_last, y_last) = (last(region.x0, self.chunks_x()), last(region.y0, self.chunks_y()));
        (y_first..=y_last).flat_map(move |cy| (x_first..=x_last).map(move |cx| ChunkCoord { cx, cy }))
    }

    /// Whether a region lies entirely inside the canvas.
    pub fn fits(&self, region: &Region) -> bool {
        u64::from(region.x0) + u64::from(region.size) <= u64::from(self.width)
            && u64::from(region.y0) + u64::from(region.size) <= u64::from(self.height)
    }
}

impl Region {
    /// Snap an arbitrary point down to the `size`-aligned grid.
    ///
    /// Negative input is rejected since no grid cell can contain it.
    pub fn snap(x: i64, y: i64, size: u32) -> Result<Self, GeometryError> {
        if x < 0 || y < 0 || size == 0 {
            return Err(GeometryError::OutOfBounds { x, y });
        }
        let s = i64::from(size);
        let x0 = u32::try_from((x / s) * s).map_err(|_| GeometryError::OutOfBounds { x, y })?;
        let y0 = u32::try_from((y / s) * s).map_err(|_| GeometryError::OutOfBounds { x, y })?;
        Ok(Self { x0, y0, size })
    }

    /// Whether the region covers pixel `(x, y)`.
    pub fn covers(&self, x: u32, y: u32) -> bool {
        x >= self.x0
            && y >= self.y0
            && u64::from(x) < u64::from(self.x0) + u64::from(self.size)
            && u64::from(y) < u64::from(self.y0) + u64::from(self.size)
    }

    /// Axis-aligned rectangle intersection test.
    pub fn overlaps(&self, other: &Region) -> bool {
        let (ax0, ay0, asz) = (u64::from(self.x0), u64::from(self.y0), u64::from(self.size));
        let (bx0, by0, bsz) = (u64::from(other.x0), u64::from(other.y0), u64::from(other.size));
        !(ax0 + asz <= bx0 || ax0 >= bx0 + bsz || ay0 + asz <= by0 || ay0 >= by0 + bsz)
    }
}
