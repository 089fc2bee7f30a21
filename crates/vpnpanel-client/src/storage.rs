use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{ClientError, ClientResult};

/// Persisted string key-value storage, the client's equivalent of browser
/// local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> ClientResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ClientResult<()>;
    fn remove(&self, key: &str) -> ClientResult<()>;
}

/// In-process store. Lost on exit; used by tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ClientResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| ClientError::Storage(format!("Store lock poisoned: {}", e)))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// SQLite-backed store: one `kv` table in a single file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> ClientResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.with_conn_mut(run_migrations)?;

        info!("Session store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> ClientResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.with_conn_mut(run_migrations)?;
        Ok(store)
    }

    fn with_conn<F, T>(&self, f: F) -> ClientResult<T>
    where
        F: FnOnce(&Connection) -> ClientResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ClientError::Storage(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> ClientResult<T>
    where
        F: FnOnce(&mut Connection) -> ClientResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| ClientError::Storage(format!("DB lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
                .optional()?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = datetime('now')",
                (key, value),
            )?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            Ok(())
        })
    }
}

fn run_migrations(conn: &mut Connection) -> ClientResult<()> {
    let tx = conn.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Session store: running migration v1 (kv table)");
        tx.execute_batch(
            "
            CREATE TABLE kv (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    tx.commit()?;
    Ok(())
}
