//! Host configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the docker binary path.
pub const DOCKER_BINARY_ENV: &str = "DOCKER_COMMANDER_BINARY";

/// How long the post-start container ID probe waits for the cidfile.
pub const CIDFILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Initial delay of the cidfile probe back-off.
pub const CIDFILE_INITIAL_DELAY: Duration = Duration::from_millis(10);

/// Per-retry growth of the cidfile probe back-off.
pub const CIDFILE_DELAY_STEP: Duration = Duration::from_millis(10);

/// Ceiling of the cidfile probe back-off.
pub const CIDFILE_MAX_DELAY: Duration = Duration::from_secs(1);

/// Configuration options for a local docker host.
///
/// Create it with defaults and modify fields as needed.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Docker binary to invoke. When unset, `initialize` discovers it via
    /// `which docker`, honoring [`DOCKER_BINARY_ENV`] first.
    pub docker_binary: Option<PathBuf>,
    /// Parent directory for the per-session temp directory holding
    /// cidfiles. Defaults to the system temp directory.
    pub temp_root: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            docker_binary: std::env::var(DOCKER_BINARY_ENV).ok().map(PathBuf::from),
            temp_root: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_temp_root() {
        let config = HostConfig {
            docker_binary: None,
            ..HostConfig::default()
        };
        assert!(config.temp_root.is_none());
        assert!(config.docker_binary.is_none());
    }
}
