//! Append-only log of mutation intents waiting for remote confirmation.
//!
//! An entry is removed only after its remote write succeeded, so a crash
//! between the remote write and the local removal replays the entry on the
//! next drain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp};
use crate::models::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Action::Add),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            _ => Err(format!("Unknown action '{}'", s)),
        }
    }
}

/// Payload of an `add`: the full document, without an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddData {
    pub item: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateData {
    pub item_id: String,
    pub updates: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteData {
    pub item_id: String,
}

/// An action together with the data shape that action requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Add(AddData),
    Update(UpdateData),
    Delete(DeleteData),
}

impl Mutation {
    pub fn add<T: Serialize>(item: &T) -> Result<Self, serde_json::Error> {
        Ok(Mutation::Add(AddData {
            item: serde_json::to_value(item)?,
        }))
    }

    pub fn update<U: Serialize>(
        item_id: impl Into<String>,
        updates: &U,
    ) -> Result<Self, serde_json::Error> {
        Ok(Mutation::Update(UpdateData {
            item_id: item_id.into(),
            updates: serde_json::to_value(updates)?,
        }))
    }

    pub fn delete(item_id: impl Into<String>) -> Self {
        Mutation::Delete(DeleteData {
            item_id: item_id.into(),
        })
    }

    pub fn action(&self) -> Action {
        match self {
            Mutation::Add(_) => Action::Add,
            Mutation::Update(_) => Action::Update,
            Mutation::Delete(_) => Action::Delete,
        }
    }

    /// Target document id. Adds have none until the remote store assigns one.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Mutation::Add(_) => None,
            Mutation::Update(data) => Some(&data.item_id),
            Mutation::Delete(data) => Some(&data.item_id),
        }
    }

    fn encode_data(&self) -> Result<String, serde_json::Error> {
        match self {
            Mutation::Add(data) => serde_json::to_string(data),
            Mutation::Update(data) => serde_json::to_string(data),
            Mutation::Delete(data) => serde_json::to_string(data),
        }
    }

    fn decode(action: Action, data: &str) -> Result<Self, serde_json::Error> {
        Ok(match action {
            Action::Add => Mutation::Add(serde_json::from_str(data)?),
            Action::Update => Mutation::Update(serde_json::from_str(data)?),
            Action::Delete => Mutation::Delete(serde_json::from_str(data)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub id: String,
    pub collection: Collection,
    pub mutation: Mutation,
    pub created_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn action(&self) -> Action {
        self.mutation.action()
    }
}

/// A stored queue record, which may not decode.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEntry {
    Valid(PendingOperation),
    Corrupt { id: String, reason: String },
}

#[derive(Debug)]
pub enum QueueError {
    /// No local medium; the caller must write to the remote store directly.
    StorageUnavailable,
    Storage(sqlx::Error),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::StorageUnavailable => {
                write!(f, "Pending-operation queue unavailable: no local storage")
            }
            QueueError::Storage(e) => write!(f, "Queue storage error: {}", e),
            QueueError::Serialize(e) => write!(f, "Failed to encode operation: {}", e),
        }
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueueError::StorageUnavailable => None,
            QueueError::Storage(e) => Some(e),
            QueueError::Serialize(e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Storage(e)
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Serialize(e)
    }
}

#[derive(sqlx::FromRow)]
struct OperationRow {
    id: String,
    action: String,
    data: String,
    created_at: String,
}

impl OperationRow {
    fn into_entry(self, collection: Collection) -> QueueEntry {
        let action = match Action::from_str(&self.action) {
            Ok(action) => action,
            Err(reason) => return QueueEntry::Corrupt { id: self.id, reason },
        };
        let mutation = match Mutation::decode(action, &self.data) {
            Ok(mutation) => mutation,
            Err(e) => {
                return QueueEntry::Corrupt {
                    id: self.id,
                    reason: format!("invalid {} data: {}", action, e),
                }
            }
        };
        let Some(created_at) = parse_timestamp(&self.created_at) else {
            return QueueEntry::Corrupt {
                id: self.id,
                reason: format!("invalid timestamp '{}'", self.created_at),
            };
        };

        QueueEntry::Valid(PendingOperation {
            id: self.id,
            collection,
            mutation,
            created_at,
        })
    }
}

/// Durable FIFO of pending operations, per collection.
#[derive(Clone, Debug)]
pub struct PendingQueue {
    pool: Option<SqlitePool>,
}

impl PendingQueue {
    pub(crate) fn new(pool: Option<SqlitePool>) -> Self {
        Self { pool }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    /// Appends an operation and returns its freshly generated id.
    pub async fn enqueue(
        &self,
        collection: Collection,
        mutation: &Mutation,
    ) -> Result<String, QueueError> {
        let pool = self.pool.as_ref().ok_or(QueueError::StorageUnavailable)?;

        let id = Uuid::new_v4().to_string();
        let data = mutation.encode_data()?;

        sqlx::query(
            "INSERT INTO pending_operations (id, action, collection, data, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(mutation.action().as_str())
        .bind(collection.as_str())
        .bind(&data)
        .bind(format_timestamp(&Utc::now()))
        .execute(pool)
        .await?;

        tracing::debug!(
            "Queued {} on {} as {}",
            mutation.action(),
            collection,
            id
        );
        Ok(id)
    }

    /// All records for a collection, oldest first, including corrupt ones.
    pub async fn scan(&self, collection: Collection) -> Result<Vec<QueueEntry>, QueueError> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };

        let rows: Vec<OperationRow> = sqlx::query_as(
            "SELECT id, action, data, created_at FROM pending_operations WHERE collection = ? ORDER BY created_at ASC, seq ASC",
        )
        .bind(collection.as_str())
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_entry(collection))
            .collect())
    }

    /// Valid operations for a collection ordered by creation time.
    pub async fn list_by_collection(
        &self,
        collection: Collection,
    ) -> Result<Vec<PendingOperation>, QueueError> {
        let entries = self.scan(collection).await?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry {
                QueueEntry::Valid(op) => Some(op),
                QueueEntry::Corrupt { id, reason } => {
                    tracing::warn!("Skipping corrupt pending operation {}: {}", id, reason);
                    None
                }
            })
            .collect())
    }

    /// Removes an operation. Removing an unknown id is a no-op.
    pub async fn dequeue(&self, id: &str) -> Result<(), QueueError> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        sqlx::query("DELETE FROM pending_operations WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, QueueError> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let row = sqlx::query("SELECT COUNT(*) AS count FROM pending_operations")
            .fetch_one(pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }

    pub async fn count_by_collection(&self, collection: Collection) -> Result<usize, QueueError> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let row =
            sqlx::query("SELECT COUNT(*) AS count FROM pending_operations WHERE collection = ?")
                .bind(collection.as_str())
                .fetch_one(pool)
                .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }
}
