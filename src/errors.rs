//! Gateway Error Hierarchy
//!
//! Defines the error types for the document gateway, categorized by the stage
//! at which an operation or bulk request can fail: admission, dispatch,
//! visiting and response transport.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Work rejected before it reached the backend
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// Terminal failures while issuing a backend call
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Bulk visiting failures
    #[error(transparent)]
    Visit(#[from] VisitError),

    /// Response channel failures
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Infrastructure-level failures (IO, serialization, tasks)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Reasons for refusing new work at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Rejecting execution due to overload: {depth} operations already enqueued in {queue}, max is {max}")]
    QueueFull {
        queue: &'static str,
        depth: usize,
        max: usize,
    },

    #[error("Rejecting execution due to overload: oldest operation in {queue} has waited {age:?}, max is {max_age:?}")]
    QueueTooOld {
        queue: &'static str,
        age: Duration,
        max_age: Duration,
    },

    /// Queuing is disabled and the backend refused the operation synchronously
    #[error("Rejecting execution due to overload: backend did not accept the operation")]
    Overloaded,

    #[error("Rejecting execution: gateway is shutting down")]
    ShuttingDown,
}

impl AdmissionError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::QueueFull { .. } => "full",
            AdmissionError::QueueTooOld { .. } => "too_old",
            AdmissionError::Overloaded => "overloaded",
            AdmissionError::ShuttingDown => "shutting_down",
        }
    }
}

/// Terminal dispatch failures. Neither variant is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The request itself is malformed
    #[error("{0}")]
    BadRequest(String),

    /// The backend refused the operation permanently, or an internal error occurred
    #[error("{0}")]
    Server(String),
}

#[derive(Debug, thiserror::Error)]
pub enum VisitError {
    #[error("Failed to create visitor session: {0}")]
    SessionCreation(String),

    #[error("Invalid continuation: {0}")]
    InvalidContinuation(String),

    #[error("Invalid visitor parameters: {0}")]
    InvalidParameters(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Response already committed")]
    AlreadyCommitted,

    #[error("Response channel closed")]
    Closed,

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::System(SystemError::Json(e))
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(e))
    }
}
