//! Local replica of remote documents.
//!
//! Rows are keyed by `(store, id)` where the store is the collection the
//! document belongs to. Each row remembers whether it reflects confirmed
//! remote state or an optimistic local write.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::marker::PhantomData;

use super::{format_timestamp, parse_timestamp};
use crate::models::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Matches the last state read from or confirmed by the remote store.
    Synced,
    /// Written locally, remote confirmation outstanding.
    Pending,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "synced" => SyncStatus::Synced,
            _ => SyncStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntity<T> {
    pub id: String,
    pub payload: T,
    pub cached_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
}

impl<T> CachedEntity<T> {
    pub fn synced(id: impl Into<String>, payload: T) -> Self {
        Self {
            id: id.into(),
            payload,
            cached_at: Utc::now(),
            sync_status: SyncStatus::Synced,
        }
    }

    pub fn pending(id: impl Into<String>, payload: T) -> Self {
        Self {
            id: id.into(),
            payload,
            cached_at: Utc::now(),
            sync_status: SyncStatus::Pending,
        }
    }
}

#[derive(Debug)]
pub enum CacheError {
    Storage(sqlx::Error),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Storage(e) => write!(f, "Cache storage error: {}", e),
            CacheError::Serialize(e) => write!(f, "Failed to serialize cached entity: {}", e),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Storage(e) => Some(e),
            CacheError::Serialize(e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::Storage(e)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialize(e)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CacheRow {
    id: String,
    payload: String,
    sync_status: String,
    cached_at: String,
}

impl CacheRow {
    fn decode<T: DeserializeOwned>(&self) -> Option<CachedEntity<T>> {
        let payload = match serde_json::from_str(&self.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Skipping unreadable cache entry {}: {}", self.id, e);
                return None;
            }
        };

        Some(CachedEntity {
            id: self.id.clone(),
            payload,
            cached_at: parse_timestamp(&self.cached_at).unwrap_or_else(Utc::now),
            sync_status: SyncStatus::parse(&self.sync_status),
        })
    }
}

/// Rows captured when `get_all` ran, most recently cached first.
///
/// Payloads are decoded on iteration; `iter` can be called again to restart.
#[derive(Debug, Clone)]
pub struct CacheSnapshot<T> {
    rows: Vec<CacheRow>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> CacheSnapshot<T> {
    fn new(rows: Vec<CacheRow>) -> Self {
        Self {
            rows,
            _payload: PhantomData,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CachedEntity<T>> + '_ {
        self.rows.iter().filter_map(|row| row.decode())
    }

    pub fn find(&self, id: &str) -> Option<CachedEntity<T>> {
        self.rows.iter().find(|r| r.id == id).and_then(|row| row.decode())
    }
}

/// Durable key/value cache of meals and shopping items.
#[derive(Clone, Debug)]
pub struct LocalCache {
    pool: Option<SqlitePool>,
}

impl LocalCache {
    pub(crate) fn new(pool: Option<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Whether the underlying medium exists in this runtime.
    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    /// Upserts entities by id, stamping each with the current time.
    pub async fn put<T: Serialize>(
        &self,
        store: Collection,
        entities: &[CachedEntity<T>],
    ) -> Result<(), CacheError> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        let mut tx = pool.begin().await?;
        for entity in entities {
            let payload = serde_json::to_string(&entity.payload)?;
            sqlx::query(
                r#"
                INSERT INTO cache_entries (store, id, payload, sync_status, cached_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(store, id) DO UPDATE SET
                    payload = excluded.payload,
                    sync_status = excluded.sync_status,
                    cached_at = excluded.cached_at
                "#,
            )
            .bind(store.as_str())
            .bind(&entity.id)
            .bind(&payload)
            .bind(entity.sync_status.as_str())
            .bind(format_timestamp(&Utc::now()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn get_all<T: DeserializeOwned>(
        &self,
        store: Collection,
    ) -> Result<CacheSnapshot<T>, CacheError> {
        let Some(pool) = &self.pool else {
            return Ok(CacheSnapshot::empty());
        };

        let rows: Vec<CacheRow> = sqlx::query_as(
            "SELECT id, payload, sync_status, cached_at FROM cache_entries WHERE store = ? ORDER BY cached_at DESC, rowid DESC",
        )
        .bind(store.as_str())
        .fetch_all(pool)
        .await?;

        Ok(CacheSnapshot::new(rows))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        store: Collection,
        id: &str,
    ) -> Result<Option<CachedEntity<T>>, CacheError> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };

        let row: Option<CacheRow> = sqlx::query_as(
            "SELECT id, payload, sync_status, cached_at FROM cache_entries WHERE store = ? AND id = ?",
        )
        .bind(store.as_str())
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().and_then(|row| row.decode()))
    }

    /// Removes one entity. Missing ids are not an error.
    pub async fn delete(&self, store: Collection, id: &str) -> Result<(), CacheError> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        sqlx::query("DELETE FROM cache_entries WHERE store = ? AND id = ?")
            .bind(store.as_str())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_synced(&self, store: Collection, id: &str) -> Result<(), CacheError> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        sqlx::query("UPDATE cache_entries SET sync_status = 'synced' WHERE store = ? AND id = ?")
            .bind(store.as_str())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Moves an optimistic entry to the id the remote store assigned.
    ///
    /// If a row already exists under `to`, that row wins and the local one is
    /// dropped. The mapping is remembered for [`LocalCache::resolve_id`].
    pub async fn rekey(&self, store: Collection, from: &str, to: &str) -> Result<(), CacheError> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };
        if from == to {
            return self.mark_synced(store, from).await;
        }

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO id_aliases (store, local_id, remote_id) VALUES (?, ?, ?)",
        )
        .bind(store.as_str())
        .bind(from)
        .bind(to)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE OR IGNORE cache_entries SET id = ?, sync_status = 'synced' WHERE store = ? AND id = ?",
        )
        .bind(to)
        .bind(store.as_str())
        .bind(from)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM cache_entries WHERE store = ? AND id = ?")
            .bind(store.as_str())
            .bind(from)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Maps a local id to the remote id it was rekeyed to, if any.
    pub async fn resolve_id(&self, store: Collection, id: &str) -> Result<String, CacheError> {
        let Some(pool) = &self.pool else {
            return Ok(id.to_string());
        };

        let remote: Option<(String,)> =
            sqlx::query_as("SELECT remote_id FROM id_aliases WHERE store = ? AND local_id = ?")
                .bind(store.as_str())
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(remote.map(|(remote_id,)| remote_id).unwrap_or_else(|| id.to_string()))
    }

    /// Replaces the synced portion of a store with fresh remote state.
    ///
    /// Pending rows are never touched, even when the remote set carries a
    /// document with the same id. Their operations have not been replayed yet
    /// and the local edit wins until they are.
    pub async fn replace_synced<T: Serialize>(
        &self,
        store: Collection,
        entities: &[CachedEntity<T>],
    ) -> Result<usize, CacheError> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let mut seen = HashSet::new();
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM cache_entries WHERE store = ? AND sync_status = 'synced'")
            .bind(store.as_str())
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for (offset, entity) in entities.iter().enumerate() {
            if !seen.insert(entity.id.as_str()) {
                continue;
            }
            let payload = serde_json::to_string(&entity.payload)?;
            // Keep the remote newest-first order when read back most-recent-first.
            let cached_at = now - chrono::Duration::microseconds(offset as i64);
            sqlx::query(
                r#"
                INSERT INTO cache_entries (store, id, payload, sync_status, cached_at)
                VALUES (?, ?, ?, 'synced', ?)
                ON CONFLICT(store, id) DO NOTHING
                "#,
            )
            .bind(store.as_str())
            .bind(&entity.id)
            .bind(&payload)
            .bind(format_timestamp(&cached_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(seen.len())
    }
}
