//! Error types for host operations.

use commander_error::CommonError;
use thiserror::Error;

/// Result type alias for host operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur during host operations.
///
/// Startup failures (daemon down, invalid image, bad arguments) are *not*
/// errors: the corresponding operation resolves with `Ok(None)` and the
/// caller is expected to check. Errors here are transport failures and
/// violated usage invariants.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Common errors shared across docker-commander crates.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// A docker CLI invocation could not be performed.
    #[error("docker command failed: {0}")]
    Docker(String),

    /// HTTP transport failure talking to a remote host.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credential exchange with a remote host failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Internal lock poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Common(CommonError::from(err))
    }
}

impl CoreError {
    /// Creates a new invalid state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::Common(CommonError::invalid_state(msg))
    }

    /// Returns true if this is an invalid state error.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::Common(CommonError::InvalidState(_)))
    }
}
