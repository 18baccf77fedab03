use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use tracing::{debug, instrument};

use super::{KvStore, StoreError};
use crate::db::Database;

/// [`KvStore`] backed by the `kv_entries` table.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    db: Database,
}

impl SqliteKvStore {
    /// Wraps an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    #[instrument(skip(self))]
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query(r"SELECT value FROM kv_entries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.get("value");
        let value = serde_json::from_str(&raw)
            .map_err(|e| StoreError::serialization(namespace, key, e))?;
        Ok(Some(value))
    }

    #[instrument(skip(self, value))]
    async fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_string(&value).map_err(|e| StoreError::serialization(namespace, key, e))?;

        sqlx::query(
            r"INSERT INTO kv_entries (namespace, key, value, updated_at)
              VALUES (?, ?, ?, datetime('now'))
              ON CONFLICT(namespace, key)
              DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(namespace)
        .bind(key)
        .bind(&encoded)
        .execute(self.db.pool())
        .await?;

        debug!(bytes = encoded.len(), "stored value");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(r"DELETE FROM kv_entries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_store_roundtrip_and_overwrite() {
        let store = SqliteKvStore::new(Database::new_in_memory().await.unwrap());

        store.set("links", "links", json!(["a"])).await.unwrap();
        store.set("links", "links", json!(["a", "b"])).await.unwrap();

        assert_eq!(
            store.get("links", "links").await.unwrap(),
            Some(json!(["a", "b"]))
        );
    }

    #[tokio::test]
    async fn test_sqlite_store_get_or_default() {
        let store = SqliteKvStore::new(Database::new_in_memory().await.unwrap());
        let value = store.get_or("links", "missing", json!([])).await.unwrap();
        assert_eq!(value, json!([]));
    }

    #[tokio::test]
    async fn test_sqlite_store_corrupt_value_is_serialization_error() {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO kv_entries (namespace, key, value) VALUES ('n', 'k', '{oops')")
            .execute(db.pool())
            .await
            .unwrap();

        let store = SqliteKvStore::new(db);
        let err = store.get("n", "k").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_store_delete() {
        let store = SqliteKvStore::new(Database::new_in_memory().await.unwrap());
        store.set("n", "k", json!(1)).await.unwrap();
        assert!(store.delete("n", "k").await.unwrap());
        assert!(store.get("n", "k").await.unwrap().is_none());
    }
}
