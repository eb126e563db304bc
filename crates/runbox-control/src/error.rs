use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use runbox_agent::{ScriptNameError, format_error_chain};
use serde::Serialize;

/// Errors returned by HTTP handlers, rendered as `{ "error", "message" }` JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Unknown run or missing file. Benign; nothing changed.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ScriptNameError> for ApiError {
    fn from(value: ScriptNameError) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            ApiError::Internal(err) => {
                tracing::error!(error = %format_error_chain(&err), "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "internal server error".to_string(),
                )
            }
        };

        (status, axum::Json(ErrorBody { error, message })).into_response()
    }
}
