use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;

/// Errors surfaced to HTTP clients as plain-text bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Database not initialized")]
    StoreUnavailable,
    #[error("Failed to retrieve data")]
    Query(#[source] sqlx::Error),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable => Self::StoreUnavailable,
            StoreError::Query(e) => Self::Query(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::StoreUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Query(e) => {
                error!(error = %e, "Failed to retrieve data");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
