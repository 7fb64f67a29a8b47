//! Bucket and key handlers.
//!
//! The path shape mirrors the store layout: the first segment names the
//! bucket, the remainder (slashes included) is the key. Store calls are
//! synchronous disk I/O, so each handler moves them onto the blocking pool.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::task;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::StoreError;

async fn run_blocking<T, F>(op: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(op)
        .await
        .map_err(|e| AppError::Internal(format!("storage task failed: {e}")))?
        .map_err(AppError::from)
}

/// `GET /{bucket}/{key}` - return the stored value bytes.
pub async fn fetch(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let store = state.store.clone();
    let value = run_blocking(move || store.get(&bucket, &key)).await?;
    Ok(value.into_response())
}

/// `PUT /{bucket}/{key}` - store the request body under the key.
pub async fn store(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let store = state.store.clone();
    run_blocking(move || store.put(&bucket, &key, &body)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /{bucket}/{key}` - remove the key.
pub async fn remove(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let store = state.store.clone();
    run_blocking(move || store.delete(&bucket, &key)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /{bucket}` - list the bucket's keys in order.
pub async fn list(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let store = state.store.clone();
    let keys = run_blocking(move || store.list(&bucket)).await?;
    Ok(Json(keys))
}
