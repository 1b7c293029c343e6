//! Client side of the remote document store.
//!
//! The remote store is the source of truth. The sync engine only needs the
//! four calls on [`RemoteStore`]; [`HttpRemoteStore`] implements them against
//! the `cartsense-server` REST API.

mod http;
#[cfg(test)]
pub mod memory;

pub use http::{check_server, HttpRemoteStore, IDEMPOTENCY_HEADER};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::models::Collection;

/// A document as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub id: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Errors from a single remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// Sync is not configured
    NotConfigured,
    /// Target document does not exist
    NotFound(String),
    /// API key rejected
    Unauthorized,
    /// Could not reach the server
    Connection(String),
    /// Server answered with an unexpected status
    Status(u16, String),
    /// Response body did not parse
    Decode(String),
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::NotConfigured => write!(
                f,
                "Sync not configured. Add server_url and api_key to config."
            ),
            RemoteError::NotFound(id) => write!(f, "Remote document not found: {}", id),
            RemoteError::Unauthorized => write!(f, "Remote store rejected the API key"),
            RemoteError::Connection(e) => write!(f, "Connection error: {}", e),
            RemoteError::Status(code, body) => {
                write!(f, "Remote store returned {}: {}", code, body)
            }
            RemoteError::Decode(e) => write!(f, "Invalid response from remote store: {}", e),
        }
    }
}

impl std::error::Error for RemoteError {}

/// The authoritative document store the sync engine replays against.
pub trait RemoteStore: Send + Sync {
    /// Creates a document and returns its generated id.
    ///
    /// Repeating a create with the same idempotency key returns the id of the
    /// document the first call created.
    fn create(
        &self,
        collection: Collection,
        document: &serde_json::Value,
        idempotency_key: Option<&str>,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    /// Merges `partial` into an existing document. Fails with `NotFound` if absent.
    fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: &serde_json::Value,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Removes a document. Deleting an absent document succeeds.
    fn delete(
        &self,
        collection: Collection,
        id: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// All documents in the collection, newest first.
    fn query_ordered_desc(
        &self,
        collection: Collection,
    ) -> impl Future<Output = Result<Vec<RemoteDocument>, RemoteError>> + Send;
}
