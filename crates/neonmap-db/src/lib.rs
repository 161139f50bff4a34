//! # neonmap-db
//!
//! SQLite persistence for the canvas: the chunk blobs that hold the pixels,
//! wallet cooldown rows, shields, and the append-only placement, stamp and
//! payment logs. The daemon keeps one database file, `neonmap.db` inside its
//! data directory.
//!
//! Query functions live in [`queries`], one module per table, and take a
//! plain `&Connection` so callers decide how the connection is shared.
//! Timestamps and amounts are u64 values stored as INTEGER. A payment
//! signature can be recorded once (`payments.signature` is UNIQUE); that
//! constraint is the replay guard for paid operations.

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;

use rusqlite::Connection;

/// Version written to `PRAGMA user_version` once migrations finish.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("corrupt row: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Connection settings applied on every open.
///
/// Chunk rows are 64 KiB blobs rewritten on every pixel, so the page cache
/// is sized to keep a full default canvas (64 chunks) resident, and WAL
/// checkpoints run more often than the default to bound the log.
const PRAGMAS: &[(&str, i64)] = &[
    ("foreign_keys", 1),
    ("busy_timeout", 3_000),
    // NORMAL: a crash can lose the last commits but never corrupts.
    ("synchronous", 1),
    ("temp_store", 2),
    ("cache_size", -8_192),
    ("wal_autocheckpoint", 256),
];

/// Open the database file at `path`, creating and migrating it as needed.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;
    if mode != "wal" {
        tracing::warn!(path = %path.display(), mode = %mode, "Database is not in WAL mode");
    }
    prepare(conn)
}

/// Open a private in-memory database with the full schema.
pub fn open_memory() -> Result<Connection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection> {
    for &(name, value) in PRAGMAS {
        conn.pragma_update(None, name, value)?;
    }
    migrations::run(&conn)?;
    Ok(conn)
}

/// Read an INTEGER column holding a u64 timestamp or amount.
pub(crate) fn get_u64(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}

/// Read a nullable INTEGER column holding a u64.
pub(crate) fn get_opt_u64(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(|v| v as u64))
}
