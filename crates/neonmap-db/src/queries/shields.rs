//! Shield queries.
//!
//! Expiry is evaluated lazily: every read filters on `expires_at > now`.
//! Rows are never updated or deleted.

use neonmap_types::{PaymentRecord, Region, Shield};
use rusqlite::{Connection, OptionalExtension};

use crate::{get_u64, queries::payments, Result};

const SHIELD_COLUMNS: &str = "id, owner, x0, y0, size, expires_at, created_at";

/// Outcome of [`insert_paid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShieldInsert {
    /// Payment recorded and shield created.
    Created,
    /// The payment signature was already consumed; nothing written.
    PaymentReused,
    /// The owner already holds an active shield; nothing written.
    OwnerHasActive { shield_id: String },
    /// The region intersects an active shield; nothing written.
    Overlap { shield_id: String },
}

fn row_to_shield(row: &rusqlite::Row<'_>) -> rusqlite::Result<Shield> {
    Ok(Shield {
        id: row.get(0)?,
        owner: row.get(1)?,
        x0: row.get(2)?,
        y0: row.get(3)?,
        size: row.get(4)?,
        expires_at: get_u64(row, 5)?,
        created_at: get_u64(row, 6)?,
    })
}

/// All active shields.
pub fn active(conn: &Connection, now: u64) -> Result<Vec<Shield>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SHIELD_COLUMNS} FROM shields WHERE expires_at > ?1 ORDER BY created_at"
    ))?;
    let rows = stmt
        .query_map([now as i64], row_to_shield)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The owner's active shield, if any.
pub fn active_for_owner(conn: &Connection, owner: &str, now: u64) -> Result<Option<Shield>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {SHIELD_COLUMNS} FROM shields WHERE owner = ?1 AND expires_at > ?2
                 ORDER BY expires_at DESC LIMIT 1"
            ),
            rusqlite::params![owner, now as i64],
            row_to_shield,
        )
        .optional()?;
    Ok(row)
}

/// The active shield covering `(x, y)`, if any.
pub fn covering(conn: &Connection, x: u32, y: u32, now: u64) -> Result<Option<Shield>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {SHIELD_COLUMNS} FROM shields
                 WHERE expires_at > ?3
                   AND ?1 >= x0 AND ?1 < x0 + size
                   AND ?2 >= y0 AND ?2 < y0 + size
                 LIMIT 1"
            ),
            rusqlite::params![x, y, now as i64],
            row_to_shield,
        )
        .optional()?;
    Ok(row)
}

/// The first active shield intersecting `region`, if any.
pub fn first_overlapping(conn: &Connection, region: &Region, now: u64) -> Result<Option<Shield>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {SHIELD_COLUMNS} FROM shields
                 WHERE expires_at > ?4
                   AND NOT (?1 + ?3 <= x0 OR ?1 >= x0 + size OR ?2 + ?3 <= y0 OR ?2 >= y0 + size)
                 LIMIT 1"
            ),
            rusqlite::params![region.x0, region.y0, region.size, now as i64],
            row_to_shield,
        )
        .optional()?;
    Ok(row)
}

/// The first active shield owned by someone other than `wallet` that
/// intersects `region`.
pub fn first_foreign_overlapping(
    conn: &Connection,
    region: &Region,
    wallet: &str,
    now: u64,
) -> Result<Option<Shield>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {SHIELD_COLUMNS} FROM shields
                 WHERE expires_at > ?4 AND owner <> ?5
                   AND NOT (?1 + ?3 <= x0 OR ?1 >= x0 + size OR ?2 + ?3 <= y0 OR ?2 >= y0 + size)
                 LIMIT 1"
            ),
            rusqlite::params![region.x0, region.y0, region.size, now as i64, wallet],
            row_to_shield,
        )
        .optional()?;
    Ok(row)
}

/// Record `payment` and create `shield` in one transaction.
///
/// Owner uniqueness and region overlap are re-checked inside the transaction.
/// If any check fails the transaction rolls back, so the payment is only
/// consumed when the shield is actually granted.
pub fn insert_paid(
    conn: &Connection,
    payment: &PaymentRecord,
    shield: &Shield,
    now: u64,
) -> Result<ShieldInsert> {
    let tx = conn.unchecked_transaction()?;

    if let Some(existing) = active_for_owner(&tx, &shield.owner, now)? {
        return Ok(ShieldInsert::OwnerHasActive {
            shield_id: existing.id,
        });
    }
    if let Some(existing) = first_overlapping(&tx, &shield.region(), now)? {
        return Ok(ShieldInsert::Overlap {
            shield_id: existing.id,
        });
    }
    if !payments::insert(&tx, payment)? {
        return Ok(ShieldInsert::PaymentReused);
    }

    tx.execute(
        "INSERT INTO shields (id, owner, x0, y0, size, expires_at, created_at, payment_sig)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            shield.id,
            shield.owner,
            shield.x0,
            shield.y0,
            shield.size,
            shield.expires_at as i64,
            shield.created_at as i64,
            payment.signature,
        ],
    )?;
    tx.commit()?;
    Ok(ShieldInsert::Created)
}
