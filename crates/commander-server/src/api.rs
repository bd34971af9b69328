//! Control-plane router.

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use commander_core::LocalDockerHost;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AuthConfig, AuthState};
use crate::handlers;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// The wrapped local host.
    pub host: LocalDockerHost,
    /// Credential validation and session tokens.
    pub auth: Arc<AuthState>,
}

/// Creates the control-plane router. Every route except `/auth` requires
/// a session token in `X-Access-Token`.
#[must_use]
pub fn create_router(host: LocalDockerHost, auth: AuthConfig) -> Router {
    let state = AppState {
        host,
        auth: Arc::new(AuthState::new(auth)),
    };

    let protected = Router::new()
        .route("/initialize", get(handlers::initialize))
        .route("/check_daemon", get(handlers::check_daemon))
        .route("/close", get(handlers::close))
        .route("/id_by_name", get(handlers::id_by_name))
        .route("/create", get(handlers::create))
        .route("/run", get(handlers::run))
        .route("/exec", get(handlers::exec))
        .route("/command", get(handlers::command))
        .route("/stdout", get(handlers::stdout))
        .route("/stderr", get(handlers::stderr))
        .route("/wait_ready", get(handlers::wait_ready))
        .route("/wait_exit", get(handlers::wait_exit))
        .route("/stop", get(handlers::stop))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    Router::new()
        .route("/auth", get(handlers::auth))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
