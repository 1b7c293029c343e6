mod cache;
mod queue;

pub use cache::{CacheError, CacheSnapshot, CachedEntity, LocalCache, SyncStatus};
pub use queue::{
    Action, AddData, DeleteData, Mutation, PendingOperation, PendingQueue, QueueEntry, QueueError,
    UpdateData,
};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Errors opening the local persistence medium.
#[derive(Debug)]
pub enum StorageError {
    /// The database file or its directory could not be opened.
    Unavailable(PathBuf, String),
    /// The schema could not be brought up to date.
    Migration(sqlx::migrate::MigrateError),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Unavailable(path, e) => {
                write!(f, "Local storage unavailable at '{}': {}", path.display(), e)
            }
            StorageError::Migration(e) => write!(f, "Failed to migrate local storage: {}", e),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Migration(e) => Some(e),
            _ => None,
        }
    }
}

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool, StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StorageError::Unavailable(path.to_path_buf(), e.to_string()))?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)
        .map_err(|e| StorageError::Unavailable(path.to_path_buf(), e.to_string()))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| StorageError::Unavailable(path.to_path_buf(), e.to_string()))?;

    sqlx::migrate!("./migrations/client")
        .run(&pool)
        .await
        .map_err(StorageError::Migration)?;

    Ok(pool)
}

/// Process-wide handle to the local medium backing the cache and the queue.
///
/// An unavailable store keeps the rest of the system running: reads come back
/// empty and writes are skipped, so callers fall back to the remote store.
#[derive(Clone, Debug, Default)]
pub struct LocalStore {
    pool: Option<SqlitePool>,
}

impl LocalStore {
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let pool = init_db(path).await?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn unavailable() -> Self {
        Self { pool: None }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    pub fn cache(&self) -> LocalCache {
        LocalCache::new(self.pool.clone())
    }

    pub fn queue(&self) -> PendingQueue {
        PendingQueue::new(self.pool.clone())
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_db_creates_tables() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = init_db(&db_path).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(table_names.contains(&"cache_entries"));
        assert!(table_names.contains(&"pending_operations"));
        assert!(table_names.contains(&"id_aliases"));
    }

    #[tokio::test]
    async fn test_open_fails_when_parent_is_a_file() {
        let temp_dir = tempdir().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = LocalStore::open(&blocker.join("cache.db")).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_, _))));
    }

    #[test]
    fn test_unavailable_store() {
        let store = LocalStore::unavailable();
        assert!(!store.is_available());
        assert!(!store.cache().is_available());
        assert!(!store.queue().is_available());
    }

    #[test]
    fn test_timestamp_roundtrip_sorts() {
        use chrono::SubsecRound;

        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(5);
        let a = format_timestamp(&earlier);
        let b = format_timestamp(&later);

        assert!(a < b);
        assert_eq!(parse_timestamp(&a).unwrap(), earlier.trunc_subsecs(6));
    }
}
