//! Forward-only schema migrations for a single guild database.
//!
//! Each step is guarded by the stored `schemaVersion` and committed in its own
//! transaction together with the version bump, so a failing step leaves the
//! previously recorded version intact. Version targets are sparse and
//! monotonic; a database created today and one upgraded from an old version
//! converge on the same table set.

use rusqlite::{Connection, Transaction};
use tracing::info;

use crate::error::StoreError;

pub const LATEST_VERSION: i64 = 12;

type Step = fn(&Transaction) -> rusqlite::Result<()>;

const STEPS: &[(i64, Step)] = &[
    (1, main_table),
    (6, default_prefix),
    (12, permissions_table),
];

/// Settings storage for guild-wide values (prefix, schemaVersion, ...).
fn main_table(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute(
        "CREATE TABLE IF NOT EXISTS main(
            setting_id TEXT,
            setting_data TEXT,
            PRIMARY KEY(\"setting_id\")
        )",
        [],
    )?;
    Ok(())
}

fn default_prefix(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO main(setting_id, setting_data) VALUES('prefix', '.')",
        [],
    )?;
    Ok(())
}

fn permissions_table(tx: &Transaction) -> rusqlite::Result<()> {
    tx.execute(
        "CREATE TABLE IF NOT EXISTS permissions_settings(
            setting_id TEXT,
            setting_data TEXT
        )",
        [],
    )?;
    Ok(())
}

/// Reads the stored schema version, defaulting to 0 when the `main` table or
/// the version row is missing or unreadable.
fn stored_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT setting_data FROM main WHERE setting_id = 'schemaVersion'",
        [],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(0)
}

/// Applies every step whose target version exceeds the stored version, in
/// increasing order. Idempotent: a second call is a no-op beyond the version
/// read.
pub fn run(conn: &mut Connection, guild_id: u64) -> Result<(), StoreError> {
    let original = stored_version(conn);
    let mut version = original;

    for (target, step) in STEPS {
        if version >= *target {
            continue;
        }

        let failed = |source| StoreError::Migration {
            guild: guild_id,
            version: *target,
            source,
        };

        let tx = conn.transaction().map_err(failed)?;
        step(&tx).map_err(failed)?;
        tx.execute(
            "INSERT OR REPLACE INTO main(setting_id, setting_data) VALUES('schemaVersion', ?1)",
            [target.to_string()],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        version = *target;
    }

    if version != original {
        info!(
            "Database updated from schema version {} to {} for guild {}",
            original, version, guild_id
        );
    }

    Ok(())
}
