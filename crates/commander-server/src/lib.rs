//! # commander-server
//!
//! HTTP control-plane endpoint wrapping a [`commander_core::LocalDockerHost`].
//!
//! A thin façade: every endpoint is one GET mapped onto the corresponding
//! host operation, with JSON responses and a session-token auth bootstrap
//! (`/auth`). A `RemoteDockerHost` pointed at this endpoint behaves like
//! the local host it wraps, replicating process output by offset-based
//! polling.

pub mod api;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use api::{create_router, AppState};
pub use auth::{AuthConfig, AuthState};
pub use error::{Result, ServerError};
pub use server::{CommanderServer, ServerConfig};
