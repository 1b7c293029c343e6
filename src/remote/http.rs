//! HTTP client for the CartSense document server.

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{RemoteDocument, RemoteError, RemoteStore};
use crate::config::SyncConfig;
use crate::models::Collection;

/// Header carrying the client-generated key that makes `create` replay-safe.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Deserialize)]
struct DocumentsResponse {
    documents: Vec<RemoteDocument>,
}

#[derive(Clone, Debug)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpRemoteStore {
    /// Creates a client from config.
    ///
    /// Returns an error if sync is not configured.
    pub fn from_config(config: &SyncConfig) -> Result<Self, RemoteError> {
        let server_url = config
            .server_url
            .clone()
            .ok_or(RemoteError::NotConfigured)?;
        let api_key = config.api_key.clone().ok_or(RemoteError::NotConfigured)?;
        Ok(Self::new(server_url, api_key))
    }

    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: normalize_base_url(&server_url.into()),
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn documents_url(&self, collection: Collection) -> String {
        format!(
            "{}/collections/{}/documents",
            self.base_url,
            collection.as_str()
        )
    }

    fn document_url(&self, collection: Collection, id: &str) -> String {
        format!(
            "{}/{}",
            self.documents_url(collection),
            urlencoding::encode(id)
        )
    }

    async fn error_from(response: Response, id: Option<&str>) -> RemoteError {
        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
            StatusCode::NOT_FOUND => RemoteError::NotFound(id.unwrap_or_default().to_string()),
            _ => {
                let body = response.text().await.unwrap_or_default();
                RemoteError::Status(status.as_u16(), body)
            }
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn create(
        &self,
        collection: Collection,
        document: &serde_json::Value,
        idempotency_key: Option<&str>,
    ) -> Result<String, RemoteError> {
        let mut request = self
            .client
            .post(self.documents_url(collection))
            .bearer_auth(&self.api_key)
            .json(document);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, None).await);
        }

        let created: CreatedResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(created.id)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: &serde_json::Value,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .patch(self.document_url(collection, id))
            .bearer_auth(&self.api_key)
            .json(partial)
            .send()
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response, Some(id)).await)
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.document_url(collection, id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::error_from(response, Some(id)).await),
        }
    }

    async fn query_ordered_desc(
        &self,
        collection: Collection,
    ) -> Result<Vec<RemoteDocument>, RemoteError> {
        let response = self
            .client
            .get(self.documents_url(collection))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, None).await);
        }

        let body: DocumentsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(body.documents)
    }
}

/// Returns true if the server's health endpoint answers.
pub async fn check_server(server_url: &str) -> bool {
    let url = format!("{}/health", normalize_base_url(server_url));
    let client = match Client::builder().timeout(HEALTH_TIMEOUT).build() {
        Ok(client) => client,
        Err(_) => return false,
    };

    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!("Health check to {} failed: {}", url, e);
            false
        }
    }
}

/// Converts ws(s) URLs to http(s), adds a scheme to bare hosts and strips
/// trailing slashes.
fn normalize_base_url(server_url: &str) -> String {
    let url = if let Some(rest) = server_url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        format!("http://{}", server_url)
    } else {
        server_url.to_string()
    };

    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_http_url() {
        let store = HttpRemoteStore::new("http://localhost:8080/", "key");
        assert_eq!(store.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_normalize_ws_url() {
        let store = HttpRemoteStore::new("wss://sync.example.com", "key");
        assert_eq!(store.base_url(), "https://sync.example.com");
    }

    #[test]
    fn test_normalize_bare_host() {
        let store = HttpRemoteStore::new("localhost:8080", "key");
        assert_eq!(store.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_document_urls() {
        let store = HttpRemoteStore::new("http://localhost:8080", "key");
        assert_eq!(
            store.documents_url(Collection::ShoppingList),
            "http://localhost:8080/collections/shoppingList/documents"
        );
        assert_eq!(
            store.document_url(Collection::SavedMeals, "a b/c"),
            "http://localhost:8080/collections/savedMeals/documents/a%20b%2Fc"
        );
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = SyncConfig {
            server_url: Some("http://localhost:8080".into()),
            ..Default::default()
        };
        assert_eq!(
            HttpRemoteStore::from_config(&config).unwrap_err(),
            RemoteError::NotConfigured
        );
    }

    #[tokio::test]
    async fn test_check_server_unreachable() {
        // Port 9 (discard) is closed on test machines
        assert!(!check_server("http://127.0.0.1:9").await);
    }
}
