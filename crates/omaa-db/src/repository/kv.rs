//! # Key-Value Repository
//!
//! A string-keyed store of string values. The sync engine keeps its whole
//! queue under one key, so every write replaces the full value.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  sync_kv                                                     │
//! │  ┌──────────────────────┬────────────────────┬────────────┐ │
//! │  │ key (PK)             │ value              │ updated_at │ │
//! │  ├──────────────────────┼────────────────────┼────────────┤ │
//! │  │ omaa_offline_queue   │ [{"id":...}, ...]  │ RFC 3339   │ │
//! │  └──────────────────────┴────────────────────┴────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Repository for the `sync_kv` table.
#[derive(Debug, Clone)]
pub struct KvRepository {
    pool: SqlitePool,
}

impl KvRepository {
    /// Creates a new KvRepository.
    pub fn new(pool: SqlitePool) -> Self {
        KvRepository { pool }
    }

    /// Reads the value stored under `key`.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub async fn put(&self, key: &str, value: &str) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO sync_kv (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(key = %key, bytes = value.len(), "Stored value");
        Ok(())
    }

    /// Removes `key`. Returns true if a row was deleted.
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sync_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists all keys in ascending order.
    pub async fn keys(&self) -> DbResult<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM sync_kv ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("key")).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_get_missing_key() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(db.kv().get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_replaces_value() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let kv = db.kv();

        kv.put("queue", "[]").await.unwrap();
        kv.put("queue", r#"[{"id":"a"}]"#).await.unwrap();

        assert_eq!(kv.get("queue").await.unwrap().as_deref(), Some(r#"[{"id":"a"}]"#));
        assert_eq!(kv.keys().await.unwrap(), vec!["queue".to_string()]);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let kv = db.kv();

        kv.put("a", "1").await.unwrap();
        kv.put("b", "2").await.unwrap();

        assert!(kv.delete("a").await.unwrap());
        assert!(!kv.delete("a").await.unwrap());
        assert_eq!(kv.keys().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_value_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        {
            let db = Database::new(DbConfig::new(&path)).await.unwrap();
            db.kv().put("omaa_offline_queue", "[1,2,3]").await.unwrap();
            db.close().await;
        }

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        assert_eq!(
            db.kv().get("omaa_offline_queue").await.unwrap().as_deref(),
            Some("[1,2,3]")
        );
    }
}
