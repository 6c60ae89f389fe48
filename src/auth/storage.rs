// Durable key-value backends for the credential store

use anyhow::{anyhow, Context, Result};
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key-value storage the credential store persists into.
///
/// Multi-key writes and removals must be applied atomically with respect to
/// readers of the same backend.
pub trait CredentialStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;

    fn remove_many(&self, keys: &[&str]) -> Result<()>;

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.remove_many(&[key])
    }
}

/// In-memory backend, used by tests and short-lived sessions
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("Memory storage lock poisoned"))
    }
}

impl CredentialStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.lock()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.lock()?;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// SQLite backend: a single `session_kv` table in a local database file
pub struct SqliteStorage {
    conn: Mutex<rusqlite::Connection>,
    path: Option<PathBuf>,
}

impl SqliteStorage {
    /// Open (or create) the session database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session directory: {}", parent.display())
            })?;
        }

        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;

        tracing::debug!("Opened session database: {}", path.display());
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .context("Failed to open in-memory SQLite database")?;
        Self::init(conn, None)
    }

    fn init(conn: rusqlite::Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create session_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the database file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }
}

impl CredentialStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM session_kv WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read session key '{}'", key))
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .context("Failed to begin session transaction")?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO session_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )
            .with_context(|| format!("Failed to write session key '{}'", key))?;
        }
        tx.commit().context("Failed to commit session write")
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .context("Failed to begin session transaction")?;
        for key in keys {
            tx.execute(
                "DELETE FROM session_kv WHERE key = ?1",
                rusqlite::params![key],
            )
            .with_context(|| format!("Failed to remove session key '{}'", key))?;
        }
        tx.commit().context("Failed to commit session removal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(storage: &dyn CredentialStorage) {
        assert_eq!(storage.get("access_token").unwrap(), None);

        storage
            .set_many(&[("access_token", "a1"), ("refresh_token", "r1")])
            .unwrap();
        assert_eq!(storage.get("access_token").unwrap().as_deref(), Some("a1"));
        assert_eq!(storage.get("refresh_token").unwrap().as_deref(), Some("r1"));

        storage.set("access_token", "a2").unwrap();
        assert_eq!(storage.get("access_token").unwrap().as_deref(), Some("a2"));

        storage.remove_many(&["access_token", "refresh_token"]).unwrap();
        assert_eq!(storage.get("access_token").unwrap(), None);
        assert_eq!(storage.get("refresh_token").unwrap(), None);

        // Removing missing keys is not an error
        storage.remove("access_token").unwrap();
    }

    #[test]
    fn test_memory_storage() {
        exercise(&MemoryStorage::new());
    }

    #[test]
    fn test_sqlite_storage_in_memory() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(storage.path().is_none());
        exercise(&storage);
    }

    #[test]
    fn test_sqlite_storage_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!(
            "procurement-client-test-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let path = dir.join("session.sqlite3");

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.set("refresh_token", "persisted").unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(
            storage.get("refresh_token").unwrap().as_deref(),
            Some("persisted")
        );
        assert_eq!(storage.path(), Some(path.as_path()));

        drop(storage);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
