use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use invoicedrive_common::Error;

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// A failed request.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Caller mistakes become 400, everything else 500.
impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        if kind.is_client_error() {
            warn!("Rejected request ({}): {}", kind.as_str(), err);
            AppError::bad_request(err.to_string())
        } else {
            error!("Request failed ({}): {}", kind.as_str(), err);
            AppError::internal(err.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, AppError>;
