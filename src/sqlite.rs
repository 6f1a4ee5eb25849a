//! SQLite key-value backend.
//!
//! Features:
//! - WAL mode for concurrent readers
//! - One row per option, JSON text values
//! - Survives process restarts

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::error::{OptionsError, Result};
use crate::store::{validate_key, Entry, KeyValueStore};

/// SQLite implementation of KeyValueStore.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a SQLite store at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening SQLite options store at {:?}", path);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| OptionsError::ConnectionError(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| OptionsError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| OptionsError::ConnectionError(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| OptionsError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS options_kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite options schema initialized");
        Ok(())
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        validate_key(key)?;

        let row: Option<(String, String)> =
            sqlx::query_as("SELECT key, value FROM options_kv WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(key, value)| Entry { key, value }))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        validate_key(key)?;

        sqlx::query(
            r#"
            INSERT INTO options_kv (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(Self::now_unix())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        sqlx::query("DELETE FROM options_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM options_kv")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count_rows(store: &SqliteStore) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM options_kv")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn test_sqlite_set_and_get() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.set("ui.theme", "\"dark\"".to_string()).await.unwrap();

        let entry = store.get("ui.theme").await.unwrap().unwrap();
        assert_eq!(entry.key, "ui.theme");
        assert_eq!(entry.value, "\"dark\"");
    }

    #[tokio::test]
    async fn test_sqlite_overwrite() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.set("key", "1".to_string()).await.unwrap();
        store.set("key", "2".to_string()).await.unwrap();

        let entry = store.get("key").await.unwrap().unwrap();
        assert_eq!(entry.value, "2");
        assert_eq!(count_rows(&store).await, 1);
    }

    #[tokio::test]
    async fn test_sqlite_remove() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.set("key", "1".to_string()).await.unwrap();
        assert!(store.get("key").await.unwrap().is_some());

        store.remove("key").await.unwrap();
        assert!(store.get("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_clear() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.set("a", "1".to_string()).await.unwrap();
        store.set("b", "2".to_string()).await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(count_rows(&store).await, 0);
    }

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.db");

        let store = SqliteStore::open(&path).await.unwrap();
        store.set("ui.width", "42".to_string()).await.unwrap();
        store.close().await;

        let reopened = SqliteStore::open(&path).await.unwrap();
        let entry = reopened.get("ui.width").await.unwrap().unwrap();
        assert_eq!(entry.value, "42");
    }
}
