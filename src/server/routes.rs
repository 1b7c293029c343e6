//! HTTP API of the document server.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /collections/{collection}/documents`: List documents, newest first
//! - `POST /collections/{collection}/documents`: Create a document; honours `Idempotency-Key`
//! - `PATCH /collections/{collection}/documents/{id}`: Merge fields into a document
//! - `DELETE /collections/{collection}/documents/{id}`: Delete a document (204 even if absent)

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::storage::{DocumentStore, DocumentStoreError};
use crate::models::Collection;
use crate::remote::{RemoteDocument, IDEMPOTENCY_HEADER};

// ============================================================================
// Authentication
// ============================================================================

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    user_id: String,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct KeyFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Load API keys from config file
    pub fn load(config_path: &FsPath) -> Self {
        let contents = match std::fs::read_to_string(config_path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                return Self::default();
            }
        };

        match serde_yaml::from_str::<KeyFile>(&contents) {
            Ok(file) => {
                let store = Self::from_entries(
                    file.api_keys
                        .into_iter()
                        .map(|entry| (entry.key, entry.user_id)),
                );
                tracing::info!("Loaded {} API key(s)", store.keys.len());
                store
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            keys: entries
                .into_iter()
                .map(|(key, user_id)| (key, AuthUser { user_id }))
                .collect(),
        }
    }

    /// Validate an API key and return the associated user
    fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub api_keys: Arc<ApiKeyStore>,
}

/// Error response body
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key,
            None => {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
            }
        },
        None => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "missing_auth",
                "Authorization header required",
            )
        }
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => error_response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
    }
}

// ============================================================================
// Handlers
// ============================================================================

enum ApiError {
    UnknownCollection(String),
    Store(DocumentStoreError),
}

impl From<DocumentStoreError> for ApiError {
    fn from(e: DocumentStoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::UnknownCollection(message) => {
                error_response(StatusCode::NOT_FOUND, "unknown_collection", message)
            }
            ApiError::Store(DocumentStoreError::NotFound(id)) => error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Document not found: {}", id),
            ),
            ApiError::Store(DocumentStoreError::InvalidDocument(e)) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_document", e)
            }
            ApiError::Store(e) => {
                tracing::error!("Storage failure: {}", e);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Internal storage error",
                )
            }
        }
    }
}

fn parse_collection(name: &str) -> Result<Collection, ApiError> {
    name.parse().map_err(ApiError::UnknownCollection)
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<RemoteDocument>,
}

#[derive(Serialize)]
struct CreatedResponse {
    id: String,
}

async fn list_documents(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(collection): Path<String>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let collection = parse_collection(&collection)?;
    let documents = state.store.list(&user.user_id, collection).await?;
    Ok(Json(DocumentsResponse { documents }))
}

async fn create_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(document): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let collection = parse_collection(&collection)?;
    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|h| h.to_str().ok());

    let id = state
        .store
        .create(&user.user_id, collection, &document, idempotency_key)
        .await?;
    tracing::debug!("Created {} in {} for {}", id, collection, user.user_id);
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn update_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((collection, id)): Path<(String, String)>,
    Json(partial): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let collection = parse_collection(&collection)?;
    state
        .store
        .update(&user.user_id, collection, &id, &partial)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let collection = parse_collection(&collection)?;
    state.store.delete(&user.user_id, collection, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/collections/{collection}/documents",
            get(list_documents).post(create_document),
        )
        .route(
            "/collections/{collection}/documents/{id}",
            patch(update_document).delete(delete_document),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
