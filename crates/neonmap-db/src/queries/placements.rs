//! Append-only pixel placement log.

use neonmap_types::PlacementRecord;
use rusqlite::Connection;

use crate::{get_u64, Result};

/// Append a placement.
pub fn append(conn: &Connection, record: &PlacementRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO placements (wallet, x, y, color, ts) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            record.wallet,
            record.x,
            record.y,
            record.color,
            record.timestamp as i64,
        ],
    )?;
    Ok(())
}

/// Most recent placements of one wallet, newest first.
pub fn recent_for_wallet(conn: &Connection, wallet: &str, limit: u32) -> Result<Vec<PlacementRecord>> {
    let mut stmt = conn.prepare(
        "SELECT wallet, x, y, color, ts FROM placements
         WHERE wallet = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![wallet, limit], |row| {
            Ok(PlacementRecord {
                wallet: row.get(0)?,
                x: row.get(1)?,
                y: row.get(2)?,
                color: row.get(3)?,
                timestamp: get_u64(row, 4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Total number of placements.
pub fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM placements", [], |row| row.get(0))?;
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn record(wallet: &str, x: u32, ts: u64) -> PlacementRecord {
        PlacementRecord {
            wallet: wallet.to_string(),
            x,
            y: 0,
            color: 3,
            timestamp: ts,
        }
    }

    #[test]
    fn test_append_and_list() {
        let conn = test_db();
        append(&conn, &record("w1", 1, 10)).expect("append");
        append(&conn, &record("w1", 2, 20)).expect("append");
        append(&conn, &record("w2", 3, 30)).expect("append");

        let rows = recent_for_wallet(&conn, "w1", 10).expect("list");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].x, 2); // Most recent first
        assert_eq!(count(&conn).expect("count"), 3);
    }

    #[test]
    fn test_color_check_constraint() {
        let conn = test_db();
        let mut bad = record("w1", 1, 10);
        bad.color = 40;
        assert!(append(&conn, &bad).is_err());
    }
}
