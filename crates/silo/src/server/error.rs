use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fileindex::IndexError;
use serde::Serialize;

/// API error response.
///
/// Serialises as:
/// ```json
/// { "ok": false, "error": { "code": "<code>", "message": "<message>" } }
/// ```
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorResponse {
    pub ok: bool,
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorResponse {
                ok: false,
                error: ApiErrorBody {
                    code: code.into(),
                    message: message.into(),
                },
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotFound(key) => Self::not_found(format!("file not found: {key}")),
            IndexError::InvalidInput(msg) => Self::bad_request(msg),
            other => Self::internal(other.to_string()),
        }
    }
}
