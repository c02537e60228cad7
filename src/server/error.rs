//! Error-to-HTTP response conversion.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::progress::ProgressLineError;
use crate::storage::StorageError;
use crate::streaming::{RangeError, StreamError};
use crate::transcode::SubmitError;

/// Errors a route handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Progress(#[from] ProgressLineError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ApiError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ApiError::Storage(e) => match e {
                StorageError::UploadSizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                StorageError::UploadAborted { .. } => StatusCode::CONFLICT,
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                StorageError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Stream(e) => {
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Submit(SubmitError::AlreadyActive(_)) => StatusCode::CONFLICT,
            ApiError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Progress(_) => StatusCode::BAD_REQUEST,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Storage(StorageError::UploadSizeExceeded { .. }) => "upload_too_large",
            ApiError::Storage(StorageError::UploadAborted { .. }) => "upload_superseded",
            ApiError::Storage(StorageError::NotFound(_)) => "not_found",
            ApiError::Storage(StorageError::InvalidKey(_)) => "invalid_key",
            ApiError::Storage(StorageError::Backend(_)) => "storage_error",
            ApiError::Stream(StreamError::NotFound(_)) => "not_found",
            ApiError::Stream(StreamError::Range(RangeError::Malformed(_))) => "invalid_range",
            ApiError::Stream(StreamError::Range(RangeError::NotSatisfiable { .. })) => {
                "range_not_satisfiable"
            }
            ApiError::Stream(StreamError::MultipleRanges) => "multiple_ranges",
            ApiError::Stream(StreamError::Storage(_)) => "storage_error",
            ApiError::Submit(_) => "job_active",
            ApiError::Catalog(_) => "catalog_error",
            ApiError::Progress(_) => "invalid_progress",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.http_status();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Server error in handler");
        }

        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        let mut response = (status, axum::Json(body)).into_response();

        if let ApiError::Stream(StreamError::Range(RangeError::NotSatisfiable { size })) = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_statuses() {
        let too_large = ApiError::from(StorageError::UploadSizeExceeded { limit: 1 });
        assert_eq!(too_large.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);

        let aborted = ApiError::from(StorageError::UploadAborted { key: "k".into() });
        assert_eq!(aborted.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unsatisfiable_range_sets_content_range() {
        let err = ApiError::from(StreamError::Range(RangeError::NotSatisfiable { size: 10 }));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
    }

    #[test]
    fn test_multiple_ranges_is_416() {
        let response = StreamError::MultipleRanges.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }
}
