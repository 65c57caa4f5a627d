//! SQLite-backed [`Store`] implementation.
//!
//! Stores every document as one row `(collection, id, data)` in a single
//! generic table; `data` is the document's JSON payload. This keeps the
//! port's open-schema guarantee (§6) without hand-rolling a table per
//! collection.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{Document, Filter, Store, StoreError, apply_filters};

/// Concrete SQLite document store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the SQLite database at `database_url`, a
    /// path or `sqlite:`-prefixed URL, and run embedded migrations.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let path = database_url
            .strip_prefix("sqlite:")
            .unwrap_or(database_url);

        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("failed to create {}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to open {path}: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to create schema: {e}")))?;

        Ok(Self { pool })
    }
}

/// Open a [`SqliteStore`] at `database_url`, defaulting to
/// `~/.config/kickai/store.db` when `None` (mirrors the default the
/// teacher's `create_storage` uses for session databases).
pub async fn create_sqlite_store(database_url: Option<&str>) -> Result<SqliteStore, StoreError> {
    match database_url {
        Some(url) => SqliteStore::new(url).await,
        None => {
            let home = dirs::home_dir()
                .ok_or_else(|| StoreError::Unavailable("no home directory".to_string()))?;
            let path = home.join(".config/kickai/store.db");
            SqliteStore::new(&path.to_string_lossy()).await
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_document(
        &self,
        collection: &str,
        data: Value,
        id: Option<String>,
    ) -> Result<String, StoreError> {
        let id = id.unwrap_or_else(|| Uuid::now_v7().to_string());
        let payload = serde_json::to_string(&data)
            .map_err(|e| StoreError::ConstraintViolation(format!("non-serializable document: {e}")))?;

        sqlx::query("INSERT OR REPLACE INTO documents (collection, id, data) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(id)
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        row.map(|r| decode_row(id, r)).transpose()
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<(), StoreError> {
        let existing = self
            .get_document(collection, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;

        let mut merged = existing.data;
        if let (Value::Object(existing_map), Value::Object(patch_map)) = (&mut merged, &patch) {
            for (k, v) in patch_map {
                existing_map.insert(k.clone(), v.clone());
            }
        }

        let payload = serde_json::to_string(&merged)
            .map_err(|e| StoreError::ConstraintViolation(format!("non-serializable document: {e}")))?;

        sqlx::query("UPDATE documents SET data = ? WHERE collection = ? AND id = ?")
            .bind(payload)
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn query_documents(
        &self,
        collection: &str,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query("SELECT id, data FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(|e| StoreError::Unavailable(e.to_string()))?;
            docs.push(decode_row(&id, row)?);
        }

        Ok(apply_filters(docs, filters, limit))
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT collection FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        rows.into_iter()
            .map(|r| r.try_get::<String, _>("collection").map_err(|e| StoreError::Unavailable(e.to_string())))
            .collect()
    }
}

fn decode_row(id: &str, row: sqlx::sqlite::SqliteRow) -> Result<Document, StoreError> {
    let raw: String = row
        .try_get("data")
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let data = serde_json::from_str(&raw)
        .map_err(|e| StoreError::ConstraintViolation(format!("corrupt document {id}: {e}")))?;
    Ok(Document {
        id: id.to_string(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Filter;
    use serde_json::json;

    async fn temp_store() -> SqliteStore {
        let path = std::env::temp_dir().join(format!("kickai_test_{}.db", Uuid::new_v4()));
        SqliteStore::new(&path.to_string_lossy()).await.unwrap()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = temp_store().await;
        let id = store
            .create_document("kickai_teams", json!({"name": "Test"}), None)
            .await
            .unwrap();
        let doc = store.get_document("kickai_teams", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Test");
    }

    #[tokio::test]
    async fn update_preserves_unknown_keys() {
        let store = temp_store().await;
        let id = store
            .create_document("c", json!({"a": 1, "b": 2}), None)
            .await
            .unwrap();
        store.update_document("c", &id, json!({"a": 99})).await.unwrap();
        let doc = store.get_document("c", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["a"], 99);
        assert_eq!(doc.data["b"], 2);
    }

    #[tokio::test]
    async fn query_filters_by_equality() {
        let store = temp_store().await;
        store
            .create_document("c", json!({"team_id": "KTI"}), None)
            .await
            .unwrap();
        store
            .create_document("c", json!({"team_id": "OTHER"}), None)
            .await
            .unwrap();
        let results = store
            .query_documents("c", &[Filter::eq("team_id", json!("KTI"))], None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_it_existed() {
        let store = temp_store().await;
        let id = store.create_document("c", json!({}), None).await.unwrap();
        assert!(store.delete_document("c", &id).await.unwrap());
        assert!(!store.delete_document("c", &id).await.unwrap());
    }

    #[tokio::test]
    async fn get_missing_document_is_none() {
        let store = temp_store().await;
        assert!(store.get_document("c", "missing").await.unwrap().is_none());
    }
}
