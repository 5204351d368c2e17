//! API error types.
//!
//! Every error carries a stable code, an HTTP status and a message that is
//! safe to show to callers. Raw backend and driver errors are logged where
//! they are converted and never reach the response body.

use crate::metrics::record_request_error;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use depot_metadata::MetadataError;
use depot_storage::StorageError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::PayloadTooLarge(_) => "invalid_input",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "backend_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn internal() -> Self {
        Self::Internal("internal error".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        record_request_error(self.code());
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<depot_core::Error> for ApiError {
    fn from(e: depot_core::Error) -> Self {
        match e {
            depot_core::Error::InvalidFileId(_) => Self::NotFound("file not found".to_string()),
            // Validation messages describe the caller's input only.
            other => Self::BadRequest(other.to_string()),
        }
    }
}

/// Classify an aggregate retrieval failure by what its chunks hit.
fn chunks_failed(failures: &[depot_storage::ChunkFailure]) -> ApiError {
    let any_unavailable = failures.iter().any(|f| {
        matches!(
            f.error,
            StorageError::Unavailable(_) | StorageError::Cancelled
        )
    });
    let all_missing = !failures.is_empty()
        && failures
            .iter()
            .all(|f| matches!(f.error, StorageError::NotFound(_)));

    if any_unavailable {
        ApiError::Unavailable("content store unavailable".to_string())
    } else if all_missing {
        ApiError::NotFound("stored content not found".to_string())
    } else {
        ApiError::Internal("failed to retrieve content".to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        let mapped = match &e {
            StorageError::NotFound(_) => Self::NotFound("stored content not found".to_string()),
            StorageError::Unavailable(_) => {
                Self::Unavailable("content store unavailable".to_string())
            }
            StorageError::UploadStream(_) => {
                Self::BadRequest("upload stream interrupted".to_string())
            }
            StorageError::Cancelled => Self::Unavailable("retrieval cancelled".to_string()),
            StorageError::ChunksFailed { failures, .. } => chunks_failed(failures),
            StorageError::WriteFailed(_) => {
                Self::Internal("failed to store content".to_string())
            }
            _ => Self::internal(),
        };

        match mapped {
            Self::BadRequest(_) | Self::NotFound(_) => {
                tracing::warn!(error = %e, "storage request rejected")
            }
            _ => tracing::error!(error = %e, failed_chunks = ?e.failed_chunks(), "storage error"),
        }
        mapped
    }
}

impl From<MetadataError> for ApiError {
    fn from(e: MetadataError) -> Self {
        match &e {
            MetadataError::NotFound(_) => Self::NotFound("file not found".to_string()),
            MetadataError::Conflict(_) => {
                tracing::info!(error = %e, "duplicate content rejected");
                Self::Conflict("a file with identical content already exists".to_string())
            }
            _ if e.is_unavailable() => {
                tracing::error!(error = %e, "metadata store unreachable");
                Self::Unavailable("metadata store unavailable".to_string())
            }
            _ => {
                tracing::error!(error = %e, "metadata error");
                Self::internal()
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
