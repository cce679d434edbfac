use crate::cache::CacheError;
use crate::storage::StorageError;
use crate::types::ErrorResponse;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Rejected before storage or cache were touched.
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    StorageUnavailable(#[from] StorageError),
}

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ServiceError::InvalidInput(msg.into())
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::RefreshFailed(e) | CacheError::StorageUnavailable(e) => {
                ServiceError::StorageUnavailable(e)
            }
        }
    }
}

/// Malformed bodies answer like any other invalid input: 400 with a JSON error.
impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServiceError::StorageUnavailable(e) => {
                tracing::error!(error = %e, "storage request failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage is unavailable".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
