//! In-memory remote store with call recording and failure injection.

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::{RemoteDocument, RemoteError, RemoteStore};
use crate::models::Collection;

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Create {
        collection: Collection,
        document: serde_json::Value,
        idempotency_key: Option<String>,
    },
    Update {
        collection: Collection,
        id: String,
        partial: serde_json::Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
    Query {
        collection: Collection,
    },
}

#[derive(Default)]
struct State {
    documents: HashMap<Collection, Vec<RemoteDocument>>,
    idempotency: HashMap<(Collection, String), String>,
    calls: Vec<RemoteCall>,
    failing_calls: HashSet<usize>,
    offline: bool,
    next_ids: VecDeque<String>,
    generated: usize,
}

#[derive(Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<State>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids handed out by upcoming creates, in order.
    pub fn with_next_ids(self, ids: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .next_ids
            .extend(ids.iter().map(|id| id.to_string()));
        self
    }

    /// Makes the n-th call (zero-based, counting every call) fail.
    pub fn fail_call(&self, n: usize) {
        self.state.lock().unwrap().failing_calls.insert(n);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn seed(&self, collection: Collection, id: &str, data: serde_json::Value) {
        self.state
            .lock()
            .unwrap()
            .documents
            .entry(collection)
            .or_default()
            .push(RemoteDocument {
                id: id.to_string(),
                data,
                created_at: Utc::now(),
            });
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn documents(&self, collection: Collection) -> Vec<RemoteDocument> {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: RemoteCall) -> Result<std::sync::MutexGuard<'_, State>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        let index = state.calls.len();
        state.calls.push(call);
        if state.offline || state.failing_calls.contains(&index) {
            return Err(RemoteError::Connection("injected failure".to_string()));
        }
        Ok(state)
    }
}

impl RemoteStore for InMemoryRemoteStore {
    async fn create(
        &self,
        collection: Collection,
        document: &serde_json::Value,
        idempotency_key: Option<&str>,
    ) -> Result<String, RemoteError> {
        let mut state = self.record(RemoteCall::Create {
            collection,
            document: document.clone(),
            idempotency_key: idempotency_key.map(str::to_string),
        })?;

        if let Some(key) = idempotency_key {
            if let Some(existing) = state.idempotency.get(&(collection, key.to_string())) {
                return Ok(existing.clone());
            }
        }

        let id = match state.next_ids.pop_front() {
            Some(id) => id,
            None => {
                state.generated += 1;
                format!("remote-{}", state.generated)
            }
        };
        if let Some(key) = idempotency_key {
            state
                .idempotency
                .insert((collection, key.to_string()), id.clone());
        }
        state
            .documents
            .entry(collection)
            .or_default()
            .push(RemoteDocument {
                id: id.clone(),
                data: document.clone(),
                created_at: Utc::now(),
            });
        Ok(id)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: &serde_json::Value,
    ) -> Result<(), RemoteError> {
        let mut state = self.record(RemoteCall::Update {
            collection,
            id: id.to_string(),
            partial: partial.clone(),
        })?;

        let doc = state
            .documents
            .entry(collection)
            .or_default()
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        if let (Some(target), Some(fields)) = (doc.data.as_object_mut(), partial.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        let mut state = self.record(RemoteCall::Delete {
            collection,
            id: id.to_string(),
        })?;
        state
            .documents
            .entry(collection)
            .or_default()
            .retain(|d| d.id != id);
        Ok(())
    }

    async fn query_ordered_desc(
        &self,
        collection: Collection,
    ) -> Result<Vec<RemoteDocument>, RemoteError> {
        let state = self.record(RemoteCall::Query { collection })?;
        let mut docs = state
            .documents
            .get(&collection)
            .cloned()
            .unwrap_or_default();
        docs.reverse();
        Ok(docs)
    }
}
