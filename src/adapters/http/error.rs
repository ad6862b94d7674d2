use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use tracing::{error, warn};

use crate::domain::errors::DomainError;

/// Error body returned by the HTTP handlers: `{"detail": ...}`.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed upload field; reported against `field`.
    Validation { field: &'static str, msg: String },
    Domain(DomainError),
}

impl ApiError {
    pub fn missing_file(msg: impl Into<String>) -> Self {
        ApiError::Validation { field: "file", msg: msg.into() }
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::Domain(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation { field, msg } => {
                warn!(field, %msg, "rejected upload");
                let body = json!({
                    "detail": [{ "loc": ["body", field], "msg": msg, "type": "missing" }]
                });
                (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
            }
            ApiError::Domain(e) => {
                let status = match &e {
                    DomainError::Decode(_) | DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    DomainError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    DomainError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                    DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!(error = %e, "request failed");
                } else {
                    warn!(error = %e, status = status.as_u16(), "rejected request");
                }
                (status, Json(json!({ "detail": e.to_string() }))).into_response()
            }
        }
    }
}
