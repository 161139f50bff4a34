//! Append-only stamp log.

use neonmap_types::{PaymentRecord, Region, StampRecord, StampStatus};
use rusqlite::Connection;

use crate::queries::{payments, shields};
use crate::{get_u64, DbError, Result};

/// Outcome of [`record_paid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampPayment {
    /// Payment consumed; the region was clear of foreign shields.
    Recorded,
    /// The signature was already consumed; nothing written.
    PaymentReused,
    /// Another wallet's active shield intersects the region; nothing written.
    Protected { shield_id: String, owner: String },
}

/// Consume a stamp payment unless another wallet holds an active shield over
/// any part of `region`. Both checks and the insert share one transaction.
pub fn record_paid(conn: &Connection, payment: &PaymentRecord, region: &Region, now: u64) -> Result<StampPayment> {
    let tx = conn.unchecked_transaction()?;
    if let Some(shield) = shields::first_foreign_overlapping(&tx, region, &payment.wallet, now)? {
        return Ok(StampPayment::Protected {
            shield_id: shield.id,
            owner: shield.owner,
        });
    }
    if !payments::insert(&tx, payment)? {
        return Ok(StampPayment::PaymentReused);
    }
    tx.commit()?;
    Ok(StampPayment::Recorded)
}

/// Append a stamp record. Its payment must already be recorded.
pub fn append(conn: &Connection, record: &StampRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO stamps (wallet, x, y, width, height, payment_sig, status, chunks_applied, ts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            record.wallet,
            record.x,
            record.y,
            record.width,
            record.height,
            record.payment_ref,
            record.status.as_str(),
            record.chunks_applied,
            record.timestamp as i64,
        ],
    )?;
    Ok(())
}

/// Most recent stamps, newest first.
pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<StampRecord>> {
    let mut stmt = conn.prepare(
        "SELECT wallet, x, y, width, height, payment_sig, status, chunks_applied, ts
         FROM stamps ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok((
                StampRecord {
                    wallet: row.get(0)?,
                    x: row.get(1)?,
                    y: row.get(2)?,
                    width: row.get(3)?,
                    height: row.get(4)?,
                    payment_ref: row.get(5)?,
                    status: StampStatus::Complete,
                    chunks_applied: row.get(7)?,
                    timestamp: get_u64(row, 8)?,
                },
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(mut record, status)| {
            record.status = StampStatus::parse(&status)
                .ok_or_else(|| DbError::Serialization(format!("unknown stamp status '{status}'")))?;
            Ok(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use neonmap_types::{PaymentKind, Shield};

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn pay(conn: &Connection, sig: &str) {
        payments::insert(
            conn,
            &PaymentRecord {
                signature: sig.into(),
                wallet: "w1".into(),
                kind: PaymentKind::Stamp,
                amount: 100,
                timestamp: 1,
            },
        )
        .expect("payment");
    }

    fn stamp(sig: &str, status: StampStatus) -> StampRecord {
        StampRecord {
            wallet: "w1".into(),
            x: 0,
            y: 32,
            width: 32,
            height: 32,
            payment_ref: sig.into(),
            status,
            chunks_applied: 1,
            timestamp: 5,
        }
    }

    #[test]
    fn test_append_and_recent() {
        let conn = test_db();
        pay(&conn, "sig1");
        pay(&conn, "sig2");
        append(&conn, &stamp("sig1", StampStatus::Complete)).expect("append");
        append(&conn, &stamp("sig2", StampStatus::Partial)).expect("append");

        let rows = recent(&conn, 10).expect("recent");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].payment_ref, "sig2");
        assert_eq!(rows[0].status, StampStatus::Partial);
        assert_eq!(rows[1].status, StampStatus::Complete);
    }

    #[test]
    fn test_stamp_requires_recorded_payment() {
        let conn = test_db();
        assert!(append(&conn, &stamp("unpaid", StampStatus::Complete)).is_err());
    }

    #[test]
    fn test_record_paid_respects_foreign_shields() {
        let conn = test_db();
        let shield = Shield {
            id: "s1".into(),
            owner: "alice".into(),
            x0: 64,
            y0: 64,
            size: 64,
            expires_at: 10_000,
            created_at: 1,
        };
        let shield_payment = PaymentRecord {
            signature: "shieldSig".into(),
            wallet: "alice".into(),
            kind: PaymentKind::Shield,
            amount: 50,
            timestamp: 1,
        };
        shields::insert_paid(&conn, &shield_payment, &shield, 1).expect("shield");

        let bob = PaymentRecord {
            signature: "bobSig".into(),
            wallet: "w1".into(),
            kind: PaymentKind::Stamp,
            amount: 300,
            timestamp: 2,
        };
        let region = Region { x0: 0, y0: 0, size: 128 };
        assert_eq!(
            record_paid(&conn, &bob, &region, 2).expect("record"),
            StampPayment::Protected {
                shield_id: "s1".into(),
                owner: "alice".into()
            }
        );
        assert!(!payments::exists(&conn, "bobSig").expect("exists"));

        let clear = Region { x0: 128, y0: 0, size: 128 };
        assert_eq!(record_paid(&conn, &bob, &clear, 2).expect("record"), StampPayment::Recorded);
        assert_eq!(record_paid(&conn, &bob, &clear, 2).expect("record"), StampPayment::PaymentReused);

        let mut alice = bob.clone();
        alice.signature = "aliceSig".into();
        alice.wallet = "alice".into();
        assert_eq!(record_paid(&conn, &alice, &region, 2).expect("record"), StampPayment::Recorded);
    }
}
