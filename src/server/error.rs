//! HTTP error responses

use crate::error::BgRemovalError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable error code
    pub code: String,
}

/// Errors returned by handlers
#[derive(Debug)]
pub enum ApiError {
    /// Request rejected before reaching the pipeline
    BadRequest(String),
    NotFound(String),
    /// Pipeline or storage failure
    Processing(BgRemovalError),
}

impl From<BgRemovalError> for ApiError {
    fn from(err: BgRemovalError) -> Self {
        Self::Processing(err)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Processing(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(message) => {
                tracing::debug!(error = %message, "Rejected request");
                ErrorResponse {
                    error: message,
                    code: "BAD_REQUEST".to_string(),
                }
            },
            Self::NotFound(message) => ErrorResponse {
                error: message,
                code: "NOT_FOUND".to_string(),
            },
            Self::Processing(e) => {
                if status.is_server_error() {
                    tracing::error!(error = %e, code = e.code(), "Request failed");
                } else {
                    tracing::warn!(error = %e, code = e.code(), "Invalid input");
                }
                ErrorResponse {
                    error: format!("Processing error: {e}"),
                    code: e.code().to_string(),
                }
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(BgRemovalError::invalid_image("empty")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(BgRemovalError::decode("bad")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(BgRemovalError::model_load("u2net", "missing")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(BgRemovalError::removal_backend("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
