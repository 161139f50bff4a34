//! Consumed payment records.

use neonmap_types::{PaymentKind, PaymentRecord};
use rusqlite::{Connection, OptionalExtension};

use crate::{get_u64, DbError, Result};

/// Whether a transaction signature has already been consumed.
pub fn exists(conn: &Connection, signature: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM payments WHERE signature = ?1",
            [signature],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Record a payment. Returns `false` without writing if the signature was
/// already recorded.
pub fn insert(conn: &Connection, payment: &PaymentRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO payments (signature, wallet, kind, amount, ts)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            payment.signature,
            payment.wallet,
            payment.kind.as_str(),
            payment.amount as i64,
            payment.timestamp as i64,
        ],
    )?;
    Ok(changed == 1)
}

/// Fetch a payment by signature.
pub fn get(conn: &Connection, signature: &str) -> Result<Option<PaymentRecord>> {
    let row = conn
        .query_row(
            "SELECT signature, wallet, kind, amount, ts FROM payments WHERE signature = ?1",
            [signature],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    get_u64(row, 3)?,
                    get_u64(row, 4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(signature, wallet, kind, amount, timestamp)| {
        let kind = PaymentKind::parse(&kind)
            .ok_or_else(|| DbError::Serialization(format!("unknown payment kind '{kind}'")))?;
        Ok(PaymentRecord {
            signature,
            wallet,
            kind,
            amount,
            timestamp,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn payment(sig: &str) -> PaymentRecord {
        PaymentRecord {
            signature: sig.to_string(),
            wallet: "w1".into(),
            kind: PaymentKind::Stamp,
            amount: 300,
            timestamp: 1_000,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_db();
        assert!(!exists(&conn, "sig1").expect("exists"));
        assert!(insert(&conn, &payment("sig1")).expect("insert"));
        assert!(exists(&conn, "sig1").expect("exists"));
        assert_eq!(get(&conn, "sig1").expect("get"), Some(payment("sig1")));
    }

    #[test]
    fn test_signature_reuse_rejected() {
        let conn = test_db();
        assert!(insert(&conn, &payment("sig1")).expect("first"));
        let mut second = payment("sig1");
        second.wallet = "w2".into();
        assert!(!insert(&conn, &second).expect("second"));
        assert_eq!(get(&conn, "sig1").expect("get").map(|p| p.wallet), Some("w1".into()));
    }
}
