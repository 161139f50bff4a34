//! Chunk buffer queries.

use rusqlite::{Connection, OptionalExtension};

use crate::Result;

/// Insert a zero-filled buffer for every chunk in an `nx × ny` grid that does
/// not exist yet. Returns the number of chunks created.
pub fn provision(conn: &Connection, nx: u32, ny: u32, chunk_len: usize, now: u64) -> Result<usize> {
    let empty = vec![0u8; chunk_len];
    let tx = conn.unchecked_transaction()?;
    let mut created = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO chunks (cx, cy, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for cx in 0..nx {
            for cy in 0..ny {
                created += stmt.execute(rusqlite::params![cx, cy, empty, now as i64])?;
            }
        }
    }
    tx.commit()?;
    Ok(created)
}

/// Load a chunk buffer, `None` if the row does not exist.
pub fn load(conn: &Connection, cx: u32, cy: u32) -> Result<Option<Vec<u8>>> {
    let data = conn
        .query_row(
            "SELECT data FROM chunks WHERE cx = ?1 AND cy = ?2",
            rusqlite::params![cx, cy],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?;
    Ok(data)
}

/// Replace a chunk buffer, creating the row if needed.
pub fn store(conn: &Connection, cx: u32, cy: u32, data: &[u8], updated_at: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO chunks (cx, cy, data, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (cx, cy) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        rusqlite::params![cx, cy, data, updated_at as i64],
    )?;
    Ok(())
}

/// Last-modified time of a chunk.
pub fn updated_at(conn: &Connection, cx: u32, cy: u32) -> Result<Option<u64>> {
    let ts = conn
        .query_row(
            "SELECT updated_at FROM chunks WHERE cx = ?1 AND cy = ?2",
            rusqlite::params![cx, cy],
            |row| crate::get_u64(row, 0),
        )
        .optional()?;
    Ok(ts)
}
