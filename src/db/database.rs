use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::models::KvRow;

pub const IN_MEMORY_URL: &str = "sqlite::memory:";

/// String-keyed JSON blob store.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `:memory:` is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (\
                key TEXT PRIMARY KEY NOT NULL,\
                value TEXT NOT NULL,\
                updated_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        info!("Key-value store ready at {}", database_url);
        Ok(Database { pool })
    }

    pub async fn in_memory() -> Result<Self> {
        Self::init(IN_MEMORY_URL).await
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, KvRow>(
            "SELECT key, value, updated_at FROM kv_store WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row.value))
    }

    pub async fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        debug!("Stored {} bytes under '{}'", value.len(), key);
        Ok(())
    }

    /// Writes every entry or none of them.
    pub async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        for (key, value) in entries {
            sqlx::query(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(*key)
            .bind(value.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!("Stored {} keys in one transaction", entries.len());
        Ok(())
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, KvRow>(
            "SELECT key, value, updated_at FROM kv_store ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.key).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(db.get_raw("missing").await.unwrap(), None);

        db.set_raw("greeting", "\"hello\"").await.unwrap();
        db.set_raw("greeting", "\"hi\"").await.unwrap();
        assert_eq!(db.get_raw("greeting").await.unwrap().as_deref(), Some("\"hi\""));
        assert_eq!(db.keys().await.unwrap(), vec!["greeting"]);
    }

    #[tokio::test]
    async fn set_many_writes_all_keys() {
        let db = Database::in_memory().await.unwrap();
        db.set_many(&[("b", "2".to_string()), ("a", "1".to_string())])
            .await
            .unwrap();
        assert_eq!(db.keys().await.unwrap(), vec!["a", "b"]);
        db.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn file_database_is_created_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("studio.db").display());

        let db = Database::init(&url).await.unwrap();
        db.set_raw("key", "\"value\"").await.unwrap();
        drop(db);

        let reopened = Database::init(&url).await.unwrap();
        assert_eq!(
            reopened.get_raw("key").await.unwrap().as_deref(),
            Some("\"value\"")
        );
    }
}
