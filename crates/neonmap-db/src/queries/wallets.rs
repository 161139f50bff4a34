//! Wallet rows and the pixel cooldown compare-and-set.

use neonmap_types::WalletState;
use rusqlite::{Connection, OptionalExtension};

use crate::{get_opt_u64, get_u64, Result};

/// Result of trying to claim a cooldown slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownClaim {
    /// The slot was taken; `previous` is the prior last-placement time.
    Claimed { previous: Option<u64> },
    /// The wallet is still cooling down since `last_pixel_at`.
    Blocked { last_pixel_at: u64 },
}

fn row_to_wallet(row: &rusqlite::Row<'_>) -> rusqlite::Result<WalletState> {
    Ok(WalletState {
        wallet: row.get(0)?,
        twitter: row.get(1)?,
        last_pixel_at: get_opt_u64(row, 2)?,
        last_stamp_at: get_opt_u64(row, 3)?,
        created_at: get_u64(row, 4)?,
    })
}

/// Fetch a wallet row.
pub fn get(conn: &Connection, wallet: &str) -> Result<Option<WalletState>> {
    let row = conn
        .query_row(
            "SELECT wallet, twitter, last_pixel_at, last_stamp_at, created_at
             FROM wallets WHERE wallet = ?1",
            [wallet],
            row_to_wallet,
        )
        .optional()?;
    Ok(row)
}

/// Fetch a wallet row, creating it if absent.
pub fn ensure(conn: &Connection, wallet: &str, now: u64) -> Result<WalletState> {
    conn.execute(
        "INSERT OR IGNORE INTO wallets (wallet, created_at) VALUES (?1, ?2)",
        rusqlite::params![wallet, now as i64],
    )?;
    let row = conn.query_row(
        "SELECT wallet, twitter, last_pixel_at, last_stamp_at, created_at
         FROM wallets WHERE wallet = ?1",
        [wallet],
        row_to_wallet,
    )?;
    Ok(row)
}

/// Atomically set `last_pixel_at = now` if the wallet is eligible
/// (`last_pixel_at IS NULL OR last_pixel_at + cooldown <= now`).
///
/// The read of the previous value and the conditional upsert run in one
/// transaction, so two callers can never both claim the same window.
pub fn try_claim_cooldown(
    conn: &Connection,
    wallet: &str,
    now: u64,
    cooldown_ms: u64,
) -> Result<CooldownClaim> {
    let tx = conn.unchecked_transaction()?;
    let previous: Option<u64> = tx
        .query_row(
            "SELECT last_pixel_at FROM wallets WHERE wallet = ?1",
            [wallet],
            |row| get_opt_u64(row, 0),
        )
        .optional()?
        .flatten();

    let changed = tx.execute(
        "INSERT INTO wallets (wallet, last_pixel_at, created_at) VALUES (?1, ?2, ?2)
         ON CONFLICT (wallet) DO UPDATE SET last_pixel_at = excluded.last_pixel_at
         WHERE wallets.last_pixel_at IS NULL OR wallets.last_pixel_at + ?3 <= excluded.last_pixel_at",
        rusqlite::params![wallet, now as i64, cooldown_ms as i64],
    )?;
    tx.commit()?;

    match (changed, previous) {
        (0, Some(last_pixel_at)) => Ok(CooldownClaim::Blocked { last_pixel_at }),
        _ => Ok(CooldownClaim::Claimed { previous }),
    }
}

/// Undo a claim made at `claimed_at`, restoring `previous`.
///
/// Only applies if nobody has claimed a newer slot since. Returns whether the
/// row was restored.
pub fn release_cooldown(
    conn: &Connection,
    wallet: &str,
    claimed_at: u64,
    previous: Option<u64>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE wallets SET last_pixel_at = ?1 WHERE wallet = ?2 AND last_pixel_at = ?3",
        rusqlite::params![previous.map(|p| p as i64), wallet, claimed_at as i64],
    )?;
    Ok(changed == 1)
}

/// Record a stamp placement time on the wallet row.
pub fn touch_stamp(conn: &Connection, wallet: &str, now: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO wallets (wallet, last_stamp_at, created_at) VALUES (?1, ?2, ?2)
         ON CONFLICT (wallet) DO UPDATE SET last_stamp_at = excluded.last_stamp_at",
        rusqlite::params![wallet, now as i64],
    )?;
    Ok(())
}
