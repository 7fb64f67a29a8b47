//! Request-level error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            _ => {
                tracing::error!("Internal error: {:?}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // The API is machine-facing: the status text is the whole body.
        (
            status,
            status.canonical_reason().unwrap_or("Error").to_string(),
        )
            .into_response()
    }
}
