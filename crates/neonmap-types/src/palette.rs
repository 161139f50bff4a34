//! The fixed 32-color neon palette.
//!
//! Stored pixels are indices into [`PALETTE`]. Index 0 (black) is the
//! background every chunk starts with.

use serde::{Deserialize, Serialize};

/// Number of palette entries; valid indices are `0..PALETTE_SIZE`.
pub const PALETTE_SIZE: usize = 32;

/// An 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Palette in declaration order. Order matters: nearest-color ties resolve to
/// the lowest index.
pub const PALETTE: [Rgb; PALETTE_SIZE] = [
    Rgb(0x00, 0x00, 0x00),
    Rgb(0xFF, 0xFF, 0xFF),
    Rgb(0xFF, 0x00, 0x40),
    Rgb(0xFF, 0x00, 0x80),
    Rgb(0xFF, 0x00, 0xFF),
    Rgb(0xC0, 0x00, 0xFF),
    Rgb(0x80, 0x00, 0xFF),
    Rgb(0x40, 0x00, 0xFF),
    Rgb(0x00, 0x40, 0xFF),
    Rgb(0x00, 0x80, 0xFF),
    Rgb(0x00, 0xBF, 0xFF),
    Rgb(0x00, 0xFF, 0xFF),
    Rgb(0x00, 0xFF, 0xBF),
    Rgb(0x00, 0xFF, 0x80),
    Rgb(0x00, 0xFF, 0x40),
    Rgb(0x00, 0xFF, 0x00),
    Rgb(0x40, 0xFF, 0x00),
    Rgb(0x80, 0xFF, 0x00),
    Rgb(0xBF, 0xFF, 0x00),
    Rgb(0xFF, 0xFF, 0x00),
    Rgb(0xFF, 0xBF, 0x00),
    Rgb(0xFF, 0x80, 0x00),
    Rgb(0xFF, 0x40, 0x00),
    Rgb(0xFF, 0x60, 0x60),
    Rgb(0xFF, 0x80, 0xC0),
    Rgb(0xC0, 0x80, 0xFF),
    Rgb(0x80, 0xC0, 0xFF),
    Rgb(0x80, 0xFF, 0xC0),
    Rgb(0xFF, 0xFF, 0xA0),
    Rgb(0x40, 0x40, 0x40),
    Rgb(0x80, 0x80, 0x80),
    Rgb(0xC0, 0xC0, 0xC0),
];

/// Whether `index` names a palette entry.
pub fn is_valid(index: i64) -> bool {
    (0..PALETTE_SIZE as i64).contains(&index)
}

/// RGB value of a palette index, or `None` if out of range.
pub fn rgb(index: u8) -> Option<Rgb> {
    PALETTE.get(usize::from(index)).copied()
}

/// Index of the palette color closest to `(r, g, b)` in Euclidean RGB space.
///
/// Compares squared distances, which orders identically to true distances.
/// The first minimum wins.
pub fn nearest(r: u8, g: u8, b: u8) -> u8 {
    let mut best = 0usize;
    let mut best_dist = u32::MAX;
    for (i, c) in PALETTE.iter().enumerate() {
        let dr = i32::from(r) - i32::from(c.0);
        let dg = i32::from(g) - i32::from(c.1);
        let db = i32::from(b) - i32::from(c.2);
        let dist = (dr * dr + dg * dg + db * db) as u32;
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best as u8
}

/// Palette rendered as `#RRGGBB` strings, for clients.
pub fn hex_colors() -> Vec<String> {
    PALETTE
        .iter()
        .map(|c| format!("#{:02X}{:02X}{:02X}", c.0, c.1, c.2))
        .collect()
}
