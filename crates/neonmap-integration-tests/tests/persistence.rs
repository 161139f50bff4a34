//! Integration test: canvas state survives a restart.
//!
//! Writes through one engine over an on-disk database, drops it, and checks a
//! fresh engine over the reopened file sees the same chunks, cooldowns,
//! shields and spent signatures.

use std::sync::Arc;

use neonmap_canvas::{CanvasError, CanvasStore, ShieldRequest, SqliteStore, StampRequest};
use neonmap_integration_tests::{
    settings_for, solid_png, Harness, ScriptedVerifier, TempDb, START_MS,
};
use neonmap_types::ChunkCoord;

#[tokio::test]
async fn state_survives_restart() {
    let db = TempDb::new();
    let settings = settings_for(256, 256, 64);

    {
        let store = Arc::new(SqliteStore::open(&db.path).expect("open"));
        let h = Harness::build(
            settings.clone(),
            store,
            Arc::new(ScriptedVerifier::default()),
            START_MS,
        )
        .await;
        h.engine
            .arbitrator()
            .place("painter", 70, 70, 14)
            .await
            .expect("pixel");
        h.engine
            .shields()
            .create(ShieldRequest {
                owner: "guard".into(),
                x: 128,
                y: 128,
                duration_days: 3,
                payment_ref: "guardTx".into(),
            })
            .await
            .expect("shield");
        h.engine
            .stamps()
            .place(StampRequest {
                wallet: "artist".into(),
                x: 0,
                y: 192,
                size: 32,
                image: solid_png(32, 30),
                payment_ref: "artTx".into(),
            })
            .await
            .expect("stamp");
    }

    let store = Arc::new(SqliteStore::open(&db.path).expect("reopen"));
    let h = Harness::build(
        settings,
        store,
        Arc::new(ScriptedVerifier::default()),
        START_MS + 10_000,
    )
    .await;

    let chunk = h
        .engine
        .chunks()
        .get(ChunkCoord { cx: 1, cy: 1 })
        .await
        .expect("chunk");
    assert_eq!(chunk[6 * 64 + 6], 14);

    let stamped = h
        .engine
        .chunks()
        .get(ChunkCoord { cx: 0, cy: 3 })
        .await
        .expect("chunk");
    assert_eq!(stamped[0], 30);
    assert_eq!(stamped[31 * 64 + 31], 30);
    assert_eq!(stamped[32 * 64 + 32], 0);

    let err = h
        .engine
        .arbitrator()
        .place("painter", 1, 1, 1)
        .await
        .expect_err("cooldown persisted");
    assert!(matches!(err, CanvasError::CooldownActive { remaining_secs: 50, .. }));

    let err = h
        .engine
        .arbitrator()
        .place("visitor", 130, 130, 1)
        .await
        .expect_err("shield persisted");
    assert!(matches!(err, CanvasError::RegionProtected { .. }));

    assert!(h.store.payment_exists("guardTx").await.expect("lookup"));
    assert!(h.store.payment_exists("artTx").await.expect("lookup"));

    let wallet = h.store.wallet("artist").await.expect("lookup").expect("wallet row");
    assert_eq!(wallet.last_stamp_at, Some(START_MS));
}
