//! Durable local key-value storage.
//!
//! [`LocalStorage`] abstracts the device-local string store that backs the
//! credential record (theme, PIN hash, setup flag, biometric state). Two
//! backends are provided:
//!
//! - [`SqliteStorage`]: a single `local_storage` table in a SQLite file,
//!   restricted to owner read/write on Unix.
//! - [`MemoryStorage`]: a process-local map for tests and ephemeral runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{CryptoError, Result};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A durable string-to-string store scoped to this device.
///
/// Implementations must be `Send + Sync` so the store can be shared between
/// the session manager, the biometric binder and the shell.
pub trait LocalStorage: Send + Sync {
    /// Read a value, `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key.
    fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

/// SQLite-backed local storage.
///
/// The connection is held behind a `Mutex`; every operation is a single short
/// statement.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStorage {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(&conn)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(path = %path.display(), "local storage ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Default file location: `<data_dir>/local.db`.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("local.db")
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS local_storage (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CryptoError::LockPoisoned)
    }
}

impl LocalStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO local_storage (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        tracing::trace!(key, "local value written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM local_storage", [])?;
        tracing::info!(removed, "cleared local storage");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Process-local storage. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values.lock().map_err(|_| CryptoError::LockPoisoned)
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
