//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<Response, AppError>`; any
//! [`reelcache_common::Error`] converts with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reelcache_common::Error;
use serde_json::json;

use crate::streaming::range_not_satisfiable;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Error::RangeNotSatisfiable { size } = self.0 {
            return range_not_satisfiable(size);
        }

        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Client errors explain themselves; server errors are logged in full
        // and answered generically.
        let message = if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Request failed");
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.0.to_string()
        };

        let body = json!({
            "error": message,
            "code": self.0.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
