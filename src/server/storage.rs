//! Server-side document storage.
//!
//! Documents are JSON objects stored per user and collection in SQLite.
//! Each create may carry an idempotency key; repeating a create with the same
//! key returns the document created the first time.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp};
use crate::models::Collection;
use crate::remote::RemoteDocument;

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum DocumentStoreError {
    /// Could not open or query the database.
    Database(sqlx::Error),
    /// Schema migration failed.
    Migration(sqlx::migrate::MigrateError),
    /// Document does not exist.
    NotFound(String),
    /// Request body is not a JSON object.
    InvalidDocument(String),
}

impl std::fmt::Display for DocumentStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStoreError::Database(e) => write!(f, "Database error: {}", e),
            DocumentStoreError::Migration(e) => write!(f, "Migration error: {}", e),
            DocumentStoreError::NotFound(id) => write!(f, "Document not found: {}", id),
            DocumentStoreError::InvalidDocument(e) => write!(f, "Invalid document: {}", e),
        }
    }
}

impl std::error::Error for DocumentStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentStoreError::Database(e) => Some(e),
            DocumentStoreError::Migration(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DocumentStoreError {
    fn from(e: sqlx::Error) -> Self {
        DocumentStoreError::Database(e)
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: String,
    created_at: String,
}

impl DocumentRow {
    fn into_document(self) -> Result<RemoteDocument, DocumentStoreError> {
        let data = serde_json::from_str(&self.data)
            .map_err(|e| DocumentStoreError::InvalidDocument(e.to_string()))?;
        Ok(RemoteDocument {
            id: self.id,
            data,
            created_at: parse_timestamp(&self.created_at).unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Opens (creating if needed) the document database under `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self, DocumentStoreError> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| DocumentStoreError::Database(sqlx::Error::Io(e)))?;

        let db_url = format!("sqlite:{}?mode=rwc", data_dir.join("documents.db").display());
        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations/server")
            .run(&pool)
            .await
            .map_err(DocumentStoreError::Migration)?;

        Ok(Self { pool })
    }

    /// Stores a new document and returns its id.
    pub async fn create(
        &self,
        user_id: &str,
        collection: Collection,
        data: &serde_json::Value,
        idempotency_key: Option<&str>,
    ) -> Result<String, DocumentStoreError> {
        if !data.is_object() {
            return Err(DocumentStoreError::InvalidDocument(
                "expected a JSON object".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let now = format_timestamp(&Utc::now());

        // A replayed key hits the unique index and is ignored
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO documents (user_id, collection, id, data, idempotency_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(collection.as_str())
        .bind(&id)
        .bind(data.to_string())
        .bind(idempotency_key)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let Some(key) = idempotency_key else {
            return Ok(id);
        };

        let (stored_id,): (String,) = sqlx::query_as(
            "SELECT id FROM documents WHERE user_id = ? AND collection = ? AND idempotency_key = ?",
        )
        .bind(user_id)
        .bind(collection.as_str())
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        if stored_id != id {
            tracing::debug!("Idempotent replay of {} resolved to {}", key, stored_id);
        }
        Ok(stored_id)
    }

    /// Merges the top-level fields of `partial` into an existing document.
    pub async fn update(
        &self,
        user_id: &str,
        collection: Collection,
        id: &str,
        partial: &serde_json::Value,
    ) -> Result<(), DocumentStoreError> {
        let Some(fields) = partial.as_object() else {
            return Err(DocumentStoreError::InvalidDocument(
                "expected a JSON object".to_string(),
            ));
        };

        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT data FROM documents WHERE user_id = ? AND collection = ? AND id = ?",
        )
        .bind(user_id)
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let (data,) = existing.ok_or_else(|| DocumentStoreError::NotFound(id.to_string()))?;

        let mut document: serde_json::Value = serde_json::from_str(&data)
            .map_err(|e| DocumentStoreError::InvalidDocument(e.to_string()))?;
        if let Some(target) = document.as_object_mut() {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }

        sqlx::query(
            "UPDATE documents SET data = ?, updated_at = ? WHERE user_id = ? AND collection = ? AND id = ?",
        )
        .bind(document.to_string())
        .bind(format_timestamp(&Utc::now()))
        .bind(user_id)
        .bind(collection.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Deletes a document. Returns whether it existed.
    pub async fn delete(
        &self,
        user_id: &str,
        collection: Collection,
        id: &str,
    ) -> Result<bool, DocumentStoreError> {
        let result =
            sqlx::query("DELETE FROM documents WHERE user_id = ? AND collection = ? AND id = ?")
                .bind(user_id)
                .bind(collection.as_str())
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All documents in a collection, newest first.
    pub async fn list(
        &self,
        user_id: &str,
        collection: Collection,
    ) -> Result<Vec<RemoteDocument>, DocumentStoreError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, data, created_at FROM documents WHERE user_id = ? AND collection = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (DocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DocumentStore::open(temp_dir.path()).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_create_and_list_newest_first() {
        let (store, _temp) = setup().await;

        let first = store
            .create("alice", Collection::ShoppingList, &json!({"name": "milk"}), None)
            .await
            .unwrap();
        let second = store
            .create("alice", Collection::ShoppingList, &json!({"name": "eggs"}), None)
            .await
            .unwrap();

        let docs = store.list("alice", Collection::ShoppingList).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
    }

    #[tokio::test]
    async fn test_idempotency_key_deduplicates() {
        let (store, _temp) = setup().await;
        let doc = json!({"name": "milk"});

        let first = store
            .create("alice", Collection::ShoppingList, &doc, Some("op-1"))
            .await
            .unwrap();
        let replay = store
            .create("alice", Collection::ShoppingList, &doc, Some("op-1"))
            .await
            .unwrap();

        assert_eq!(first, replay);
        assert_eq!(
            store
                .list("alice", Collection::ShoppingList)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let (store, _temp) = setup().await;
        let id = store
            .create(
                "alice",
                Collection::ShoppingList,
                &json!({"name": "milk", "checked": false}),
                None,
            )
            .await
            .unwrap();

        store
            .update("alice", Collection::ShoppingList, &id, &json!({"checked": true}))
            .await
            .unwrap();

        let docs = store.list("alice", Collection::ShoppingList).await.unwrap();
        assert_eq!(docs[0].data, json!({"name": "milk", "checked": true}));
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let (store, _temp) = setup().await;
        let result = store
            .update("alice", Collection::SavedMeals, "nope", &json!({"name": "x"}))
            .await;
        assert!(matches!(result, Err(DocumentStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _temp) = setup().await;
        let id = store
            .create("alice", Collection::SavedMeals, &json!({"name": "Chili"}), None)
            .await
            .unwrap();

        assert!(store.delete("alice", Collection::SavedMeals, &id).await.unwrap());
        assert!(!store.delete("alice", Collection::SavedMeals, &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_users_and_collections_are_isolated() {
        let (store, _temp) = setup().await;
        store
            .create("alice", Collection::ShoppingList, &json!({"name": "milk"}), Some("k"))
            .await
            .unwrap();
        store
            .create("bob", Collection::ShoppingList, &json!({"name": "tea"}), Some("k"))
            .await
            .unwrap();

        assert_eq!(
            store.list("bob", Collection::ShoppingList).await.unwrap().len(),
            1
        );
        assert!(store
            .list("alice", Collection::SavedMeals)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_object_documents() {
        let (store, _temp) = setup().await;
        let result = store
            .create("alice", Collection::ShoppingList, &json!(["milk"]), None)
            .await;
        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }
}
