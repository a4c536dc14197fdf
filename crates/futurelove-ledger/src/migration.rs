//! Database schema migrations for SQLite.
//!
//! Simple versioned migrations. Each migration transforms the schema from
//! version N to N+1.

use rusqlite::Connection;

use futurelove_core::now_millis;

use crate::error::{LedgerError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(LedgerError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(LedgerError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: records and access control.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per registered identity. Never updated or deleted.
        CREATE TABLE encrypted_sequences (
            owner BLOB PRIMARY KEY,           -- 20 bytes
            handle BLOB NOT NULL UNIQUE,      -- 32 bytes, typed ciphertext handle
            proof BLOB NOT NULL,              -- CBOR input proof
            registered_at INTEGER NOT NULL    -- Unix ms
        );

        -- Decryption access per handle
        CREATE TABLE acl (
            handle BLOB NOT NULL,
            account BLOB NOT NULL,
            granted_at INTEGER NOT NULL,
            PRIMARY KEY (handle, account)
        );
        "#,
    )?;

    Ok(())
}
