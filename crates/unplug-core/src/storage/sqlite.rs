//! SQLite-backed key-value store.
//!
//! A single `kv` table holding JSON text. This is all the persistence the
//! scheduling core needs; session history and totals live under a couple of
//! keys written by [`crate::stats::SessionStatsStore`].

use std::path::Path;

use rusqlite::{params, Connection};
use serde_json::Value;

use super::data_dir;
use super::kv::KeyValueStore;
use crate::error::PersistenceError;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store at `~/.config/unplug/unplug.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, PersistenceError> {
        let dir = data_dir().map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        Self::open_at(&dir.join("unplug.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path).map_err(|source| PersistenceError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        let text = match result {
            Ok(v) => v,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| PersistenceError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PersistenceError> {
        let text = serde_json::to_string(&value).map_err(|e| PersistenceError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, text],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kv_roundtrip() {
        let mut store = SqliteStore::open_memory().unwrap();
        assert!(store.get("test").unwrap().is_none());
        store.set("test", json!({"hello": [1, 2]})).unwrap();
        assert_eq!(store.get("test").unwrap(), Some(json!({"hello": [1, 2]})));
    }

    #[test]
    fn corrupt_value_is_reported() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO kv (key, value) VALUES ('bad', 'not json')",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.get("bad"),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unplug.db");
        {
            let mut store = SqliteStore::open_at(&path).unwrap();
            store.set("k", json!(7)).unwrap();
        }
        let store = SqliteStore::open_at(&path).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!(7)));
    }
}
