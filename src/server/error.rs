//! HTTP error responses
//!
//! Every error leaves the service as `{"detail": "..."}` with the status code
//! chosen by `BgRemovalError::status_code`.

use crate::error::{BgRemovalError, INTERNAL_ERROR_DETAIL};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::any::Any;
use utoipa::ToSchema;

/// JSON error body
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}

impl ErrorBody {
    pub fn response(status: StatusCode, detail: impl Into<String>) -> Response {
        (
            status,
            Json(Self {
                detail: detail.into(),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for BgRemovalError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        ErrorBody::response(status, self.detail())
    }
}

/// Response for a panic caught by `CatchPanicLayer`
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %message, "Handler panicked");

    ErrorBody::response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_DETAIL)
}

/// Fallback for unknown routes
pub async fn not_found() -> Response {
    ErrorBody::response(StatusCode::NOT_FOUND, "Not Found")
}
