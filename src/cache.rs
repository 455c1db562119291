use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::db::{is_missing_table, Store};
use crate::error::StoreError;

/// A settings value as it round-trips through the store. Stored text that is
/// fully numeric deserializes as `Int`, anything else stays `Text`, SQL NULL
/// becomes `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Null,
    Int(i64),
    Text(String),
}

impl SettingValue {
    pub fn from_stored(raw: Option<String>) -> Self {
        match raw {
            None => SettingValue::Null,
            Some(s) => {
                if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                    match s.parse::<i64>() {
                        Ok(n) => SettingValue::Int(n),
                        Err(_) => SettingValue::Text(s),
                    }
                } else {
                    SettingValue::Text(s)
                }
            }
        }
    }

    pub fn to_stored(&self) -> Option<String> {
        match self {
            SettingValue::Null => None,
            SettingValue::Int(n) => Some(n.to_string()),
            SettingValue::Text(s) => Some(s.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            SettingValue::Null => false,
            SettingValue::Int(n) => *n != 0,
            SettingValue::Text(_) => true,
        }
    }
}

type Settings = HashMap<String, SettingValue>;

#[derive(Default)]
struct CacheInner {
    /// Guild-wide settings from the `main` table (prefix, schemaVersion, ...).
    main: HashMap<u64, Settings>,
    /// Per-feature settings, `features[feature][guild][key]`.
    features: HashMap<String, HashMap<u64, Settings>>,
}

/// Process-wide in-memory mirror of the per-guild settings tables.
///
/// Every feature and the authorization engine read and write through this
/// cache; it lazily creates feature tables and persists values back via
/// [`write`](SettingsCache::write). Constructed once at startup and passed by
/// handle; the internal mutex keeps the single-writer-at-a-time property.
#[derive(Clone)]
pub struct SettingsCache {
    store: Store,
    inner: Arc<Mutex<CacheInner>>,
}

impl SettingsCache {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            inner: Arc::new(Mutex::new(CacheInner::default())),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Loads the `main` settings for every discovered guild.
    pub fn init(&self) -> Result<(), StoreError> {
        for guild_id in self.store.guild_ids() {
            self.load_main(guild_id)?;
        }
        Ok(())
    }

    fn load_main(&self, guild_id: u64) -> Result<(), StoreError> {
        let rows = self
            .store
            .query_rows(guild_id, "SELECT setting_id, setting_data FROM main", [])?;
        let mut settings = Settings::new();
        for (key, raw) in rows {
            settings.insert(key, SettingValue::from_stored(raw));
        }
        self.inner.lock().unwrap().main.insert(guild_id, settings);
        Ok(())
    }

    /// Loads a feature's settings for every known guild.
    pub fn load_all(&self, feature: &str) -> Result<(), StoreError> {
        for guild_id in self.store.guild_ids() {
            self.load_one(feature, guild_id)?;
        }
        Ok(())
    }

    /// Loads a feature's settings for one guild, creating the feature's table
    /// and retrying the read exactly once if the table does not exist yet.
    /// Ensures an `enabled` flag defaulting to true.
    pub fn load_one(&self, feature: &str, guild_id: u64) -> Result<(), StoreError> {
        let query = format!("SELECT setting_id, setting_data FROM {feature}_settings");
        let rows = match self.store.query_rows(guild_id, &query, []) {
            Ok(rows) => rows,
            Err(err) if is_missing_table(&err) => {
                self.store.create_feature_table(guild_id, feature)?;
                self.store.query_rows(guild_id, &query, [])?
            }
            Err(err) => return Err(err),
        };

        let mut settings = Settings::new();
        for (key, raw) in rows {
            settings.insert(key, SettingValue::from_stored(raw));
        }
        settings
            .entry("enabled".to_string())
            .or_insert(SettingValue::Int(1));

        self.inner
            .lock()
            .unwrap()
            .features
            .entry(feature.to_string())
            .or_default()
            .insert(guild_id, settings);
        debug!("Loaded {} settings for guild {}", feature, guild_id);
        Ok(())
    }

    pub fn get(&self, feature: &str, guild_id: u64, key: &str) -> Option<SettingValue> {
        self.inner
            .lock()
            .unwrap()
            .features
            .get(feature)?
            .get(&guild_id)?
            .get(key)
            .cloned()
    }

    pub fn set(&self, feature: &str, guild_id: u64, key: &str, value: SettingValue) {
        self.inner
            .lock()
            .unwrap()
            .features
            .entry(feature.to_string())
            .or_default()
            .entry(guild_id)
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Persists every in-memory key for (feature, guild): `UPDATE`, falling
    /// back to `INSERT` when no row was affected.
    pub fn write(&self, feature: &str, guild_id: u64) -> Result<(), StoreError> {
        let snapshot: Settings = {
            let inner = self.inner.lock().unwrap();
            inner
                .features
                .get(feature)
                .and_then(|guilds| guilds.get(&guild_id))
                .cloned()
                .unwrap_or_default()
        };

        for (key, value) in snapshot {
            let data = value.to_stored();
            let updated = self.store.execute(
                guild_id,
                &format!("UPDATE {feature}_settings SET setting_data = ?1 WHERE setting_id = ?2"),
                rusqlite::params![data, key],
            )?;
            if updated == 0 {
                self.store.execute(
                    guild_id,
                    &format!(
                        "INSERT INTO {feature}_settings (setting_id, setting_data) VALUES (?1, ?2)"
                    ),
                    rusqlite::params![key, data],
                )?;
            }
        }
        Ok(())
    }

    /// Re-reads a single key from the store, bypassing the cached value, and
    /// refreshes the in-memory copy. Used where staleness matters (the
    /// authorization rule tree).
    pub fn refresh(
        &self,
        feature: &str,
        guild_id: u64,
        key: &str,
    ) -> Result<Option<SettingValue>, StoreError> {
        let query = format!(
            "SELECT setting_data FROM {feature}_settings WHERE setting_id = ?1 LIMIT 1"
        );
        let raw = match self.store.query_value(guild_id, &query, [key]) {
            Ok(raw) => raw,
            Err(err) if is_missing_table(&err) => {
                self.store.create_feature_table(guild_id, feature)?;
                self.store.query_value(guild_id, &query, [key])?
            }
            Err(err) => return Err(err),
        };

        let value = raw.map(SettingValue::from_stored);
        if let Some(value) = &value {
            self.set(feature, guild_id, key, value.clone());
        }
        Ok(value)
    }

    pub fn enabled(&self, feature: &str, guild_id: u64) -> bool {
        self.get(feature, guild_id, "enabled")
            .map(|v| v.as_bool())
            .unwrap_or(true)
    }

    /// The guild's command prefix from the `main` table, `None` when unset.
    pub fn prefix(&self, guild_id: u64) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .main
            .get(&guild_id)?
            .get("prefix")?
            .as_str()
            .map(String::from)
    }

    pub fn set_prefix(&self, guild_id: u64, prefix: &str) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .main
                .entry(guild_id)
                .or_default()
                .insert("prefix".to_string(), SettingValue::Text(prefix.to_string()));
        }

        let updated = self.store.execute(
            guild_id,
            "UPDATE main SET setting_data = ?1 WHERE setting_id = ?2",
            rusqlite::params![prefix, "prefix"],
        )?;
        if updated == 0 {
            self.store.execute(
                guild_id,
                "INSERT INTO main (setting_id, setting_data) VALUES (?1, ?2)",
                rusqlite::params!["prefix", prefix],
            )?;
        }
        Ok(())
    }

    /// Opens and loads a newly joined guild, pulling in every feature already
    /// known to the cache.
    pub fn on_guild_join(&self, guild_id: u64) -> Result<(), StoreError> {
        self.store.open(guild_id)?;
        self.load_main(guild_id)?;

        let features: Vec<String> = {
            let inner = self.inner.lock().unwrap();
            inner.features.keys().cloned().collect()
        };
        for feature in features {
            self.load_one(&feature, guild_id)?;
        }
        Ok(())
    }

    /// Drops the guild's in-memory entries. Persisted rows are deliberately
    /// retained in case the bot rejoins later.
    pub fn on_guild_leave(&self, guild_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.main.remove(&guild_id);
        for guilds in inner.features.values_mut() {
            guilds.remove(&guild_id);
        }
    }
}
