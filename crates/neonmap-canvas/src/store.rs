//! Persistence capability used by the engine.
//!
//! The engine is generic over [`CanvasStore`] so tests can substitute a
//! store that fails on demand. [`SqliteStore`] is the production
//! implementation on top of `neonmap-db`.
//!
//! Every method is a single statement or a single transaction. Cross-request
//! arbitration is done by the callers (per-chunk locks, the conditional
//! cooldown claim, the shield grant transaction), never by holding the
//! connection across calls.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use neonmap_db::queries::{chunks, payments, placements, shields, stamps, wallets};
use neonmap_db::DbError;
use neonmap_types::{
    CanvasGeometry, ChunkCoord, PaymentRecord, PlacementRecord, Region, Shield, StampRecord,
    WalletState,
};
use rusqlite::Connection;

/// Storage failure, opaque to callers above the engine.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result of an atomic cooldown claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownClaim {
    /// The claim succeeded; `previous` is the value it replaced.
    Claimed { previous: Option<u64> },
    /// The wallet is still cooling down.
    Blocked { last_pixel_at: u64 },
}

/// Result of an atomic paid shield grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShieldGrant {
    Granted,
    PaymentReused,
    OwnerHasActive { shield_id: String },
    Overlap { shield_id: String },
}

/// Result of an atomic stamp payment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampPayment {
    Recorded,
    PaymentReused,
    Protected { shield_id: String, owner: String },
}

/// Durable state behind the canvas engine.
pub trait CanvasStore: Send + Sync + 'static {
    /// Create zeroed rows for every chunk of `geometry` that has none.
    fn provision_chunks(
        &self,
        geometry: CanvasGeometry,
        now: u64,
    ) -> impl Future<Output = StoreResult<usize>> + Send;

    fn load_chunk(&self, chunk: ChunkCoord) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send;

    fn store_chunk(
        &self,
        chunk: ChunkCoord,
        data: &[u8],
        now: u64,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn wallet(&self, wallet: &str) -> impl Future<Output = StoreResult<Option<WalletState>>> + Send;

    /// Fetch the wallet row, creating it on first contact.
    fn ensure_wallet(
        &self,
        wallet: &str,
        now: u64,
    ) -> impl Future<Output = StoreResult<WalletState>> + Send;

    /// Compare-and-set the wallet's cooldown timestamp.
    fn claim_cooldown(
        &self,
        wallet: &str,
        now: u64,
        cooldown_ms: u64,
    ) -> impl Future<Output = StoreResult<CooldownClaim>> + Send;

    /// Undo a claim made at `claimed_at` if it is still the latest.
    fn release_cooldown(
        &self,
        wallet: &str,
        claimed_at: u64,
        previous: Option<u64>,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn append_placement(&self, record: &PlacementRecord) -> impl Future<Output = StoreResult<()>> + Send;

    fn active_shields(&self, now: u64) -> impl Future<Output = StoreResult<Vec<Shield>>> + Send;

    fn shield_for_owner(
        &self,
        owner: &str,
        now: u64,
    ) -> impl Future<Output = StoreResult<Option<Shield>>> + Send;

    fn shield_covering(
        &self,
        x: u32,
        y: u32,
        now: u64,
    ) -> impl Future<Output = StoreResult<Option<Shield>>> + Send;

    fn shield_overlapping(
        &self,
        region: Region,
        now: u64,
    ) -> impl Future<Output = StoreResult<Option<Shield>>> + Send;

    /// Consume `payment` and create `shield` atomically, re-checking owner
    /// uniqueness and overlap.
    fn grant_shield(
        &self,
        payment: &PaymentRecord,
        shield: &Shield,
        now: u64,
    ) -> impl Future<Output = StoreResult<ShieldGrant>> + Send;

    fn payment_exists(&self, signature: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Consume a stamp payment unless another wallet's active shield
    /// intersects `region`, checked in the same transaction.
    fn record_stamp_payment(
        &self,
        payment: &PaymentRecord,
        region: Region,
        now: u64,
    ) -> impl Future<Output = StoreResult<StampPayment>> + Send;

    /// Append the stamp log entry and bump the wallet's `last_stamp_at`.
    fn append_stamp(&self, record: &StampRecord) -> impl Future<Output = StoreResult<()>> + Send;
}

/// SQLite-backed store sharing one connection.
///
/// Statements run on the blocking pool, never on a runtime worker. SQLite
/// admits a single writer even in WAL mode, so one connection behind a
/// mutex costs no write concurrency; it only orders reads behind writes.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Open (and migrate) a database file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::new(neonmap_db::open(path)?))
    }

    /// Open a migrated in-memory database.
    pub fn open_memory() -> StoreResult<Self> {
        Ok(Self::new(neonmap_db::open_memory()?))
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> neonmap_db::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("connection mutex poisoned: {e}")))?;
            Ok(op(&guard)?)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("database task failed: {e}")))?
    }
}

impl CanvasStore for SqliteStore {
    async fn provision_chunks(&self, geometry: CanvasGeometry, now: u64) -> StoreResult<usize> {
        self.with_conn(move |conn| {
            chunks::provision(
                conn,
                geometry.chunks_x(),
                geometry.chunks_y(),
                geometry.chunk_len(),
                now,
            )
        })
        .await
    }

    async fn load_chunk(&self, chunk: ChunkCoord) -> StoreResult<Option<Vec<u8>>> {
        self.with_conn(move |conn| chunks::load(conn, chunk.cx, chunk.cy)).await
    }

    async fn store_chunk(&self, chunk: ChunkCoord, data: &[u8], now: u64) -> StoreResult<()> {
        let data = data.to_vec();
        self.with_conn(move |conn| chunks::store(conn, chunk.cx, chunk.cy, &data, now))
            .await
    }

    async fn wallet(&self, wallet: &str) -> StoreResult<Option<WalletState>> {
        let wallet = wallet.to_owned();
        self.with_conn(move |conn| wallets::get(conn, &wallet)).await
    }

    async fn ensure_wallet(&self, wallet: &str, now: u64) -> StoreResult<WalletState> {
        let wallet = wallet.to_owned();
        self.with_conn(move |conn| wallets::ensure(conn, &wallet, now)).await
    }

    async fn claim_cooldown(&self, wallet: &str, now: u64, cooldown_ms: u64) -> StoreResult<CooldownClaim> {
        let wallet = wallet.to_owned();
        let claim = self
            .with_conn(move |conn| wallets::try_claim_cooldown(conn, &wallet, now, cooldown_ms))
            .await?;
        Ok(match claim {
            wallets::CooldownClaim::Claimed { previous } => CooldownClaim::Claimed { previous },
            wallets::CooldownClaim::Blocked { last_pixel_at } => CooldownClaim::Blocked { last_pixel_at },
        })
    }

    async fn release_cooldown(&self, wallet: &str, claimed_at: u64, previous: Option<u64>) -> StoreResult<bool> {
        let wallet = wallet.to_owned();
        self.with_conn(move |conn| wallets::release_cooldown(conn, &wallet, claimed_at, previous))
            .await
    }

    async fn append_placement(&self, record: &PlacementRecord) -> StoreResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| placements::append(conn, &record)).await
    }

    async fn active_shields(&self, now: u64) -> StoreResult<Vec<Shield>> {
        self.with_conn(move |conn| shields::active(conn, now)).await
    }

    async fn shield_for_owner(&self, owner: &str, now: u64) -> StoreResult<Option<Shield>> {
        let owner = owner.to_owned();
        self.with_conn(move |conn| shields::active_for_owner(conn, &owner, now)).await
    }

    async fn shield_covering(&self, x: u32, y: u32, now: u64) -> StoreResult<Option<Shield>> {
        self.with_conn(move |conn| shields::covering(conn, x, y, now)).await
    }

    async fn shield_overlapping(&self, region: Region, now: u64) -> StoreResult<Option<Shield>> {
        self.with_conn(move |conn| shields::first_overlapping(conn, &region, now)).await
    }

    async fn grant_shield(&self, payment: &PaymentRecord, shield: &Shield, now: u64) -> StoreResult<ShieldGrant> {
        let (payment, shield) = (payment.clone(), shield.clone());
        let insert = self
            .with_conn(move |conn| shields::insert_paid(conn, &payment, &shield, now))
            .await?;
        Ok(match insert {
            shields::ShieldInsert::Created => ShieldGrant::Granted,
            shields::ShieldInsert::PaymentReused => ShieldGrant::PaymentReused,
            shields::ShieldInsert::OwnerHasActive { shield_id } => ShieldGrant::OwnerHasActive { shield_id },
            shields::ShieldInsert::Overlap { shield_id } => ShieldGrant::Overlap { shield_id },
        })
    }

    async fn payment_exists(&self, signature: &str) -> StoreResult<bool> {
        let signature = signature.to_owned();
        self.with_conn(move |conn| payments::exists(conn, &signature)).await
    }

    async fn record_stamp_payment(&self, payment: &PaymentRecord, region: Region, now: u64) -> StoreResult<StampPayment> {
        let payment = payment.clone();
        let outcome = self
            .with_conn(move |conn| stamps::record_paid(conn, &payment, &region, now))
            .await?;
        Ok(match outcome {
            stamps::StampPayment::Recorded => StampPayment::Recorded,
            stamps::StampPayment::PaymentReused => StampPayment::PaymentReused,
            stamps::StampPayment::Protected { shield_id, owner } => StampPayment::Protected { shield_id, owner },
        })
    }

    async fn append_stamp(&self, record: &StampRecord) -> StoreResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            stamps::append(&tx, &record)?;
            wallets::touch_stamp(&tx, &record.wallet, record.timestamp)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
