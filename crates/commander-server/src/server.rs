//! Control-plane server.

use std::net::SocketAddr;

use commander_core::{HostConfig, LocalDockerHost};

use crate::api::create_router;
use crate::auth::AuthConfig;
use crate::error::Result;

/// Control-plane server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP address to listen on.
    pub listen: SocketAddr,
    /// Accepted credentials.
    pub auth: AuthConfig,
    /// Configuration of the wrapped local host.
    pub host: HostConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ([127, 0, 0, 1], 8374).into(),
            auth: AuthConfig::default(),
            host: HostConfig::default(),
        }
    }
}

/// HTTP server exposing a [`LocalDockerHost`] as a control-plane
/// endpoint.
pub struct CommanderServer {
    config: ServerConfig,
}

impl CommanderServer {
    /// Creates a server with the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Runs the server until the process is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be created or the listener
    /// cannot bind.
    pub async fn run(&self) -> Result<()> {
        let host = LocalDockerHost::new(self.config.host.clone())?;
        if !host.initialize().await? {
            tracing::warn!("docker binary not found; operations will fail until it appears");
        }

        let app = create_router(host, self.config.auth.clone());
        let listener = tokio::net::TcpListener::bind(self.config.listen).await?;
        tracing::info!(listen = %self.config.listen, "control-plane endpoint listening");

        axum::serve(listener, app)
            .await
            .map_err(|e| crate::error::ServerError::Server(e.to_string()))
    }
}
