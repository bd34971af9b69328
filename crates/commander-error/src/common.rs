//! Failures shared by every layer of the supervision stack.

use std::time::Duration;

use thiserror::Error;

/// Failure modes common to hosts, runners and the endpoint crate.
///
/// Backend-specific failures (a docker invocation, an HTTP round-trip, a
/// credential exchange) belong in the wrapping crate's own error enum;
/// what lives here is the vocabulary all of them share: a lookup that
/// missed, an operation used out of order, a deadline that ran out, and
/// plain I/O.
#[derive(Debug, Error)]
pub enum CommonError {
    /// I/O failure from the host system: temp-directory handling, child
    /// process plumbing, sockets.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No runner or process is registered under this instance ID.
    #[error("no such instance: {0}")]
    InstanceNotFound(u64),

    /// No container answers to this name.
    #[error("no such container: {0}")]
    ContainerNotFound(String),

    /// An operation was used out of order.
    ///
    /// This is a programmer error, not an environmental one — reading the
    /// docker binary path before `initialize`, or minting a cidfile on a
    /// closed host. It is surfaced immediately rather than retried.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An operation exhausted its deadline.
    #[error("{operation} timed out after {}s", .limit.as_secs())]
    Timeout {
        /// What was being waited for.
        operation: String,
        /// The deadline that ran out.
        limit: Duration,
    },

    /// Broken internal plumbing: a closed channel, a poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommonError {
    /// An out-of-order operation, named.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// An exhausted deadline, naming the operation that waited.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
        }
    }

    /// Broken internal plumbing, described.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for either kind of missed lookup, instance or container.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::InstanceNotFound(_) | Self::ContainerNotFound(_))
    }

    /// True for out-of-order API use.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missed_lookups_name_the_resource() {
        let by_id = CommonError::InstanceNotFound(42);
        assert_eq!(by_id.to_string(), "no such instance: 42");
        assert!(by_id.is_not_found());

        let by_name = CommonError::ContainerNotFound("db".to_string());
        assert_eq!(by_name.to_string(), "no such container: db");
        assert!(by_name.is_not_found());

        assert!(!CommonError::internal("oops").is_not_found());
    }

    #[test]
    fn timeout_reports_operation_and_limit() {
        let err = CommonError::timeout("cidfile probe", Duration::from_secs(60));
        assert_eq!(err.to_string(), "cidfile probe timed out after 60s");
    }

    #[test]
    fn invalid_state_is_distinguishable() {
        let err = CommonError::invalid_state("docker binary path requested before initialize");
        assert!(err.is_invalid_state());
        assert!(err.to_string().starts_with("invalid state: "));
    }

    #[test]
    fn io_errors_convert_through_question_mark() {
        fn read() -> Result<String, CommonError> {
            Ok(std::fs::read_to_string("/nonexistent/cidfile")?)
        }
        let err = read().expect_err("path does not exist");
        assert!(matches!(err, CommonError::Io(_)));
        assert!(err.to_string().starts_with("I/O error: "));
    }
}
