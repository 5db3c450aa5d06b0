//! Maps the core error kinds (spec.md §7) onto HTTP statuses. `ProxpiError`
//! itself stays a plain `thiserror` enum in `proxpi-types`; the `IntoResponse`
//! impl is kept at this boundary since it's purely an HTTP-layer concern.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use proxpi_types::ProxpiError;

pub struct AppError(pub ProxpiError);

impl From<ProxpiError> for AppError {
    fn from(e: ProxpiError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ProxpiError::UpstreamUnavailable(_) => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            ProxpiError::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            ProxpiError::InvalidName(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ProxpiError::IoError(e) => {
                tracing::error!(error = %e, "local cache I/O error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal cache error".to_string())
            }
        };
        (status, message).into_response()
    }
}
