pub mod migrations;

use rusqlite::{Connection, Params};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::StoreError;

/// Per-guild settings store. Every guild owns its own SQLite file
/// (`<guild_id>.db3`) under the configured directory; connections are opened
/// on demand and kept for the life of the process.
///
/// The first statement executed for a guild since process start triggers the
/// schema migration check. Statements run in autocommit mode; only migration
/// steps use explicit transactions.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    /// None means in-memory databases (tests only).
    dir: Option<PathBuf>,
    conns: Mutex<HashMap<u64, Arc<Mutex<Connection>>>>,
    migrated: Mutex<HashSet<u64>>,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                dir: Some(dir.into()),
                conns: Mutex::new(HashMap::new()),
                migrated: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// A store whose guild databases live in memory. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                dir: None,
                conns: Mutex::new(HashMap::new()),
                migrated: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Opens (creating if absent) the guild's database file.
    pub fn open(&self, guild_id: u64) -> Result<(), StoreError> {
        let mut conns = self.inner.conns.lock().unwrap();
        if conns.contains_key(&guild_id) {
            return Ok(());
        }

        let conn = match &self.inner.dir {
            Some(dir) => {
                if let Err(source) = std::fs::create_dir_all(dir) {
                    return Err(StoreError::Directory {
                        dir: dir.display().to_string(),
                        source,
                    });
                }
                let path = dir.join(format!("{guild_id}.db3"));
                Connection::open(&path)
                    .map_err(|source| StoreError::StorageUnavailable { guild: guild_id, source })?
            }
            None => Connection::open_in_memory()
                .map_err(|source| StoreError::StorageUnavailable { guild: guild_id, source })?,
        };

        debug!("Opened database for guild {}", guild_id);
        conns.insert(guild_id, Arc::new(Mutex::new(conn)));
        Ok(())
    }

    /// Enumerates existing `*.db3` files and opens each one. Returns the guild
    /// ids found.
    pub fn discover(&self) -> Result<Vec<u64>, StoreError> {
        let Some(dir) = &self.inner.dir else {
            return Ok(self.guild_ids());
        };

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(dir).map_err(|source| StoreError::Directory {
            dir: dir.display().to_string(),
            source,
        })?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Directory {
                dir: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db3") {
                continue;
            }
            let Some(guild_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };
            self.open(guild_id)?;
            found.push(guild_id);
        }

        info!("Discovered {} guild database(s)", found.len());
        Ok(found)
    }

    /// Guilds with an open database handle.
    pub fn guild_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.inner.conns.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Commits and releases the guild's handle. Administrative use only; any
    /// later statement for this guild needs a fresh `open`.
    pub fn close(&self, guild_id: u64) -> Result<(), StoreError> {
        let conn = self
            .inner
            .conns
            .lock()
            .unwrap()
            .remove(&guild_id)
            .ok_or(StoreError::UnknownGuild(guild_id))?;
        drop(conn);
        info!("Closed database for guild {}", guild_id);
        Ok(())
    }

    /// Runs one DML statement, returning the number of affected rows.
    pub fn execute<P: Params>(
        &self,
        guild_id: u64,
        sql: &str,
        params: P,
    ) -> Result<usize, StoreError> {
        let handle = self.handle(guild_id)?;
        let conn = handle.lock().unwrap();
        Ok(conn.execute(sql, params)?)
    }

    /// Queries `(setting_id, setting_data)` rows.
    pub fn query_rows<P: Params>(
        &self,
        guild_id: u64,
        sql: &str,
        params: P,
    ) -> Result<Vec<(String, Option<String>)>, StoreError> {
        let handle = self.handle(guild_id)?;
        let conn = handle.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Queries a single `setting_data` column, `None` when no row matches.
    pub fn query_value<P: Params>(
        &self,
        guild_id: u64,
        sql: &str,
        params: P,
    ) -> Result<Option<Option<String>>, StoreError> {
        let handle = self.handle(guild_id)?;
        let conn = handle.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Creates the key/value settings table for a feature.
    pub fn create_feature_table(&self, guild_id: u64, feature: &str) -> Result<(), StoreError> {
        self.execute(
            guild_id,
            &format!(
                "CREATE TABLE IF NOT EXISTS {feature}_settings(setting_id TEXT, setting_data TEXT)"
            ),
            [],
        )?;
        info!("{}_settings table created for guild {}", feature, guild_id);
        Ok(())
    }

    fn handle(&self, guild_id: u64) -> Result<Arc<Mutex<Connection>>, StoreError> {
        let handle = self
            .inner
            .conns
            .lock()
            .unwrap()
            .get(&guild_id)
            .cloned()
            .ok_or(StoreError::UnknownGuild(guild_id))?;
        self.ensure_migrated(guild_id, &handle)?;
        Ok(handle)
    }

    fn ensure_migrated(
        &self,
        guild_id: u64,
        handle: &Arc<Mutex<Connection>>,
    ) -> Result<(), StoreError> {
        let mut migrated = self.inner.migrated.lock().unwrap();
        if migrated.contains(&guild_id) {
            return Ok(());
        }
        let mut conn = handle.lock().unwrap();
        migrations::run(&mut conn, guild_id)?;
        migrated.insert(guild_id);
        Ok(())
    }
}

/// Whether a storage error is SQLite complaining about a missing table. The
/// cache uses this to create feature tables on first touch and retry once.
pub fn is_missing_table(err: &StoreError) -> bool {
    let sql_err = match err {
        StoreError::Sql(e) => e,
        _ => return false,
    };
    matches!(
        sql_err,
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.starts_with("no such table")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_lazy_migration() {
        let store = Store::in_memory();
        store.open(1).unwrap();

        // First statement triggers migration; the main table must exist.
        let version = store
            .query_value(
                1,
                "SELECT setting_data FROM main WHERE setting_id = 'schemaVersion'",
                [],
            )
            .unwrap()
            .flatten()
            .unwrap();
        assert_eq!(version, migrations::LATEST_VERSION.to_string());
    }

    #[test]
    fn test_execute_reports_affected_rows() {
        let store = Store::in_memory();
        store.open(1).unwrap();

        let updated = store
            .execute(
                1,
                "UPDATE main SET setting_data = ?1 WHERE setting_id = ?2",
                rusqlite::params!["!", "prefix"],
            )
            .unwrap();
        assert_eq!(updated, 1);

        let missed = store
            .execute(
                1,
                "UPDATE main SET setting_data = ?1 WHERE setting_id = ?2",
                rusqlite::params!["x", "does_not_exist"],
            )
            .unwrap();
        assert_eq!(missed, 0);
    }

    #[test]
    fn test_unknown_guild() {
        let store = Store::in_memory();
        let err = store.execute(42, "SELECT 1", []).unwrap_err();
        assert!(matches!(err, StoreError::UnknownGuild(42)));
    }

    #[test]
    fn test_missing_table_detection() {
        let store = Store::in_memory();
        store.open(1).unwrap();

        let err = store
            .query_rows(1, "SELECT setting_id, setting_data FROM karma_settings", [])
            .unwrap_err();
        assert!(is_missing_table(&err));

        store.create_feature_table(1, "karma").unwrap();
        let rows = store
            .query_rows(1, "SELECT setting_id, setting_data FROM karma_settings", [])
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_close_releases_handle() {
        let store = Store::in_memory();
        store.open(1).unwrap();
        store.close(1).unwrap();
        assert!(matches!(
            store.execute(1, "SELECT 1", []),
            Err(StoreError::UnknownGuild(1))
        ));
    }
}
