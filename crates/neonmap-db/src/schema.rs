//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Wallets
-- ============================================================

CREATE TABLE IF NOT EXISTS wallets (
    wallet TEXT PRIMARY KEY,
    twitter TEXT,
    last_pixel_at INTEGER,
    last_stamp_at INTEGER,
    created_at INTEGER NOT NULL
);

-- ============================================================
-- Canvas
-- ============================================================

CREATE TABLE IF NOT EXISTS chunks (
    cx INTEGER NOT NULL,
    cy INTEGER NOT NULL,
    data BLOB NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (cx, cy)
);

CREATE TABLE IF NOT EXISTS placements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    wallet TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    color INTEGER NOT NULL CHECK (color BETWEEN 0 AND 31),
    ts INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_placements_wallet ON placements(wallet);
CREATE INDEX IF NOT EXISTS idx_placements_coords ON placements(x, y);

-- ============================================================
-- Shields
-- ============================================================

CREATE TABLE IF NOT EXISTS shields (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    x0 INTEGER NOT NULL,
    y0 INTEGER NOT NULL,
    size INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    payment_sig TEXT NOT NULL REFERENCES payments(signature)
);

CREATE INDEX IF NOT EXISTS idx_shields_owner ON shields(owner);
CREATE INDEX IF NOT EXISTS idx_shields_expires ON shields(expires_at);

-- ============================================================
-- Payments & stamps
-- ============================================================

CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    signature TEXT NOT NULL UNIQUE,
    wallet TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('stamp', 'shield')),
    amount INTEGER NOT NULL,
    ts INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS stamps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    wallet TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    payment_sig TEXT NOT NULL REFERENCES payments(signature),
    status TEXT NOT NULL CHECK (status IN ('complete', 'partial')),
    chunks_applied INTEGER NOT NULL,
    ts INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stamps_wallet ON stamps(wallet);
"#;
