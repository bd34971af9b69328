//! Error vocabulary shared by the docker-commander crates.
//!
//! [`CommonError`] names the failures every layer of the stack can hit —
//! a lookup that missed an instance or container, an operation used out
//! of order, an exhausted deadline, plain I/O — so the host backends and
//! the endpoint crate report them the same way. Failures specific to one
//! backend (a docker invocation, an HTTP round-trip, a credential
//! exchange) stay in that crate's own error enum, which wraps this one
//! transparently:
//!
//! ```rust,ignore
//! use commander_error::CommonError;
//! use thiserror::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum CoreError {
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//!
//!     #[error("docker command failed: {0}")]
//!     Docker(String),
//! }
//! ```
//!
//! Callers that only care about the category can use the predicates
//! instead of matching variants:
//!
//! ```rust
//! use commander_error::CommonError;
//!
//! fn lookup_runner(instance_id: u64) -> Result<(), CommonError> {
//!     Err(CommonError::InstanceNotFound(instance_id))
//! }
//!
//! assert!(lookup_runner(7).unwrap_err().is_not_found());
//! ```

mod common;

pub use common::CommonError;

/// Result type alias using `CommonError`.
pub type Result<T> = std::result::Result<T, CommonError>;
