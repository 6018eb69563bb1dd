//! HTTP error mapping — every handler in this crate returns `ApiError`,
//! which renders the `{code, message}` body spec.md §7 requires. `code` is
//! the stable machine-readable value; `message` is for humans and may
//! change wording across releases.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use dispatch_core::CoreError;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    Unauthenticated,
    Forbidden,
    Unavailable(String),
    Internal(anyhow::Error),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::Unavailable(_) => "QUEUE_UNAVAILABLE",
            ApiError::Internal(_) => "UNKNOWN",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(m) | ApiError::Conflict(m) | ApiError::NotFound(m) | ApiError::Unavailable(m) => {
                m.clone()
            }
            ApiError::Unauthenticated => "authentication required".to_string(),
            ApiError::Forbidden => "not permitted".to_string(),
            ApiError::Internal(e) => e.to_string(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::QueueUnavailable(m) => ApiError::Unavailable(m),
            CoreError::Validation(m) => ApiError::Validation(m),
            CoreError::NotFound(m) => ApiError::NotFound(m),
            CoreError::Conflict(m) => ApiError::Conflict(m),
            CoreError::UnknownJobType(m) => ApiError::Validation(m),
            CoreError::Other(e) => ApiError::Internal(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(code, %message, "admin control plane request failed");
        }
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
