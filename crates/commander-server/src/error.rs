//! Error types for the control-plane endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type alias for endpoint operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur while serving the control plane.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or invalid credential/token.
    #[error("access denied")]
    Unauthorized,

    /// The requested instance is not registered on this host.
    #[error("no such instance: {0}")]
    UnknownInstance(u64),

    /// The wrapped host failed.
    #[error("host error: {0}")]
    Host(#[from] commander_core::CoreError),

    /// Server-side failure (bind, I/O, shutdown).
    #[error("server error: {0}")]
    Server(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Server(err.to_string())
    }
}

impl ServerError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UnknownInstance(_) => StatusCode::NOT_FOUND,
            Self::Host(_) | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "message": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            ServerError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::UnknownInstance(9).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Server("bind failed".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
