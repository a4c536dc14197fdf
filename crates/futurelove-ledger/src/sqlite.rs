//! SQLite implementation of the Ledger trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`. A registration is one SQLite transaction
//! executed while holding the connection mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use futurelove_core::{CiphertextHandle, Clock, Identity, InputProof, SystemClock};

use crate::error::{LedgerError, Result};
use crate::migration;
use crate::traits::{EncryptedSequence, Ledger, LedgerConfig};

/// SQLite-based ledger.
pub struct SqliteLedger {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open a SQLite database at the given path, running migrations.
    pub fn open(path: impl AsRef<Path>, config: LedgerConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, config)
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory(config: LedgerConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config)
    }

    fn from_connection(mut conn: Connection, config: LedgerConfig) -> Result<Self> {
        migration::migrate(&mut conn)?;
        Ok(Self {
            config,
            clock: Arc::new(SystemClock),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Timestamp records with `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| LedgerError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

fn blob_to_array<const N: usize>(bytes: Vec<u8>, column: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| LedgerError::InvalidData(format!("{}: {} bytes", column, b.len())))
}

fn load_record(conn: &Connection, owner: &Identity) -> Result<Option<EncryptedSequence>> {
    let row: Option<(Vec<u8>, i64)> = conn
        .query_row(
            "SELECT handle, registered_at FROM encrypted_sequences WHERE owner = ?1",
            params![owner.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(handle, registered_at)| {
        Ok::<_, LedgerError>(EncryptedSequence {
            owner: *owner,
            handle: CiphertextHandle::from_bytes(blob_to_array(handle, "handle")?),
            registered_at,
        })
    })
    .transpose()
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn register(
        &self,
        caller: &Identity,
        handle: &CiphertextHandle,
        proof: &InputProof,
    ) -> Result<EncryptedSequence> {
        let (caller, handle, proof) = (*caller, *handle, *proof);
        let config = self.config;
        let now = self.clock.now_millis();
        let proof_bytes = proof
            .to_bytes()
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let record = self
            .run_blocking(move |conn| {
                let tx = conn.transaction()?;

                if load_record(&tx, &caller)?.is_some() {
                    return Err(LedgerError::AlreadyRegistered(caller));
                }

                config.admit(&caller, &handle, &proof)?;

                let taken: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM encrypted_sequences WHERE handle = ?1",
                        params![handle.as_bytes().as_slice()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if taken.is_some() {
                    return Err(LedgerError::DuplicateHandle(handle));
                }

                insert_record(&tx, &caller, &handle, &proof_bytes, now)?;

                tx.execute(
                    "INSERT OR IGNORE INTO acl (handle, account, granted_at) VALUES (?1, ?2, ?3)",
                    params![
                        handle.as_bytes().as_slice(),
                        caller.as_bytes().as_slice(),
                        now,
                    ],
                )?;

                tx.commit()?;

                Ok(EncryptedSequence {
                    owner: caller,
                    handle,
                    registered_at: now,
                })
            })
            .await?;

        debug!(owner = %record.owner, handle = %record.handle, "sequence registered");
        Ok(record)
    }

    async fn is_registered(&self, identity: &Identity) -> Result<bool> {
        Ok(self.get_record(identity).await?.is_some())
    }

    async fn get_handle(&self, identity: &Identity) -> Result<Option<CiphertextHandle>> {
        Ok(self.get_record(identity).await?.map(|r| r.handle))
    }

    async fn get_record(&self, identity: &Identity) -> Result<Option<EncryptedSequence>> {
        let identity = *identity;
        self.run_blocking(move |conn| load_record(conn, &identity))
            .await
    }

    async fn is_allowed(&self, handle: &CiphertextHandle, account: &Identity) -> Result<bool> {
        let (handle, account) = (*handle, *account);
        self.run_blocking(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM acl WHERE handle = ?1 AND account = ?2",
                    params![handle.as_bytes().as_slice(), account.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn registration_count(&self) -> Result<u64> {
        self.run_blocking(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM encrypted_sequences", [], |row| {
                    row.get(0)
                })?;
            Ok(count as u64)
        })
        .await
    }

    fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

/// Insert the record row. Another writer on the same file may have claimed
/// the owner or the handle since the checks above ran.
fn insert_record(
    conn: &Connection,
    caller: &Identity,
    handle: &CiphertextHandle,
    proof_bytes: &[u8],
    now: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO encrypted_sequences (owner, handle, proof, registered_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            caller.as_bytes().as_slice(),
            handle.as_bytes().as_slice(),
            proof_bytes,
            now,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, ref msg) if f.code == ErrorCode::ConstraintViolation => {
            if msg
                .as_deref()
                .is_some_and(|m| m.contains("encrypted_sequences.handle"))
            {
                LedgerError::DuplicateHandle(*handle)
            } else {
                LedgerError::AlreadyRegistered(*caller)
            }
        }
        other => LedgerError::Database(other),
    })?;
    Ok(())
}
