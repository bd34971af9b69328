//! Session-token authentication.
//!
//! `GET /auth` exchanges a configured credential — HTTP basic or a
//! pre-shared bearer token — for a per-session token, which every other
//! endpoint requires in the `X-Access-Token` header.

use std::collections::HashSet;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use commander_core::ACCESS_TOKEN_HEADER;
use tokio::sync::RwLock;

use crate::api::AppState;
use crate::error::ServerError;

/// Credentials the endpoint accepts on `/auth`.
///
/// With neither a user/password pair nor an API token configured, the
/// endpoint is open: any `/auth` call is granted a session token.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Account name for HTTP basic auth.
    pub username: Option<String>,
    /// Password for HTTP basic auth.
    pub password: Option<String>,
    /// Pre-shared bearer token accepted as an alternative credential.
    pub api_token: Option<String>,
}

impl AuthConfig {
    fn is_open(&self) -> bool {
        self.username.is_none() && self.api_token.is_none()
    }
}

/// Validates credentials and tracks issued session tokens.
pub struct AuthState {
    config: AuthConfig,
    sessions: RwLock<HashSet<String>>,
}

impl AuthState {
    /// Creates the auth state for the given configuration.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashSet::new()),
        }
    }

    /// Exchanges an `Authorization` header for a fresh session token.
    /// `None` when the credential is rejected.
    pub async fn exchange(&self, authorization: Option<&str>) -> Option<String> {
        if !self.credential_ok(authorization) {
            tracing::warn!("credential exchange rejected");
            return None;
        }
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.write().await.insert(token.clone());
        Some(token)
    }

    /// Returns whether a session token was issued by this endpoint.
    pub async fn verify(&self, token: &str) -> bool {
        self.sessions.read().await.contains(token)
    }

    fn credential_ok(&self, authorization: Option<&str>) -> bool {
        if self.config.is_open() {
            return true;
        }
        let Some(header) = authorization else {
            return false;
        };

        if let Some(token) = header.strip_prefix("Bearer ") {
            return self.config.api_token.as_deref() == Some(token);
        }

        if let Some(encoded) = header.strip_prefix("Basic ") {
            let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
                return false;
            };
            let decoded = String::from_utf8_lossy(&decoded).into_owned();
            let Some((username, password)) = decoded.split_once(':') else {
                return false;
            };
            return self.config.username.as_deref() == Some(username)
                && self.config.password.as_deref() == Some(password);
        }

        false
    }
}

/// Middleware requiring a valid `X-Access-Token` on every protected route.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    match token {
        Some(token) if state.auth.verify(token).await => next.run(request).await,
        _ => ServerError::Unauthorized.into_response(),
    }
}
