//! SQLite-backed user store: one row per chat with the selected county.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use korona_core::error::{KoronaError, Result};
use korona_core::traits::UserStore;
use korona_core::types::UserTarget;

pub struct SqliteUserStore {
    conn: Mutex<Connection>,
}

impl SqliteUserStore {
    /// Open or create the user database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        Self::with_connection(conn)
    }

    /// Throwaway database, used by tests and `--dispatch-now` dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(store_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                region TEXT,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| KoronaError::store(format!("lock poisoned: {e}")))
    }

    /// Number of stored users.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .map_err(store_err)?;
        Ok(n as usize)
    }
}

fn store_err(e: rusqlite::Error) -> KoronaError {
    KoronaError::store(e.to_string())
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn list_users(&self) -> Result<Vec<UserTarget>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT user_id, region FROM users ORDER BY user_id")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| Ok(UserTarget::new(row.get::<_, String>(0)?, row.get(1)?)))
            .map_err(store_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserTarget>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT user_id, region FROM users WHERE user_id = ?1",
            [user_id],
            |row| Ok(UserTarget::new(row.get::<_, String>(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(store_err)
    }

    async fn upsert(&self, user: &UserTarget) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (user_id, region, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET region = excluded.region, updated_at = excluded.updated_at",
            rusqlite::params![user.user_id, user.region, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(store_err)?;
        tracing::debug!("💾 Saved user {} → {:?}", user.user_id, user.region);
        Ok(())
    }

    async fn delete(&self, user: &UserTarget) -> Result<()> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM users WHERE user_id = ?1", [&user.user_id])
            .map_err(store_err)?;
        tracing::debug!("🗑️ Deleted user {} ({removed} rows)", user.user_id);
        Ok(())
    }
}
