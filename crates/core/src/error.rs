//! Error types for the lockstep harness
//!
//! Two layers of errors exist:
//! - [`StepError`]: what a single step body (or a resource lifecycle hook)
//!   reports. It is opaque to the harness and forwarded unchanged.
//! - [`LockstepError`]: what building or running a two-lane configuration
//!   reports to the caller.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::{FailureRecord, LaneId};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

/// Boxed collaborator error carried by [`StepError`]
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type returned by step bodies
pub type StepResult = std::result::Result<(), StepError>;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, LockstepError>;

/// Failure reported by a step body
#[derive(Debug, Error)]
pub enum StepError {
    /// The collaborator reported an error (query failed, conflict detected, ...)
    #[error("{0}")]
    Failed(#[source] BoxError),

    /// The collaborator gave up waiting (lock wait timeout, NOWAIT refusal)
    #[error("timed out: {0}")]
    TimedOut(#[source] BoxError),

    /// An expectation checked inside the step did not hold
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// A step that was expected to block finished before its deadline
    #[error("the expected timeout after {timeout:?} did not happen")]
    UnexpectedCompletion {
        /// Deadline the wrapped step should have exceeded
        timeout: Duration,
    },

    /// The step body panicked
    #[error("step panicked: {0}")]
    Panicked(String),
}

impl StepError {
    /// Wrap a collaborator error
    pub fn failed<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        StepError::Failed(error.into())
    }

    /// Wrap a collaborator timeout
    pub fn timed_out<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        StepError::TimedOut(error.into())
    }

    /// Create an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        StepError::Assertion(message.into())
    }

    /// Whether this error is a timeout indication from the collaborator
    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::TimedOut(_))
    }

    /// Access the wrapped collaborator error as a concrete type
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            StepError::Failed(inner) | StepError::TimedOut(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Build a step error from a panic payload caught with `catch_unwind`
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "(non-string panic)".to_string()
        };
        StepError::Panicked(message)
    }
}

/// Error returned by building or running a two-lane configuration
#[derive(Debug, Error)]
pub enum LockstepError {
    /// A configuration without any step cannot be run
    #[error("no steps configured")]
    NoSteps,

    /// Both lanes must declare the same number of steps
    #[error("uneven number of steps: first lane has {first}, second lane has {second}")]
    UnevenSteps {
        /// Steps declared for the first lane
        first: usize,
        /// Steps declared for the second lane
        second: usize,
    },

    /// Step declarations must alternate first, second, first, ...
    #[error("step declaration #{position} belongs to the {expected} lane, got {found}")]
    OutOfTurn {
        /// 0-based position in the declaration sequence
        position: usize,
        /// Lane whose turn it was
        expected: LaneId,
        /// Lane that was declared instead
        found: LaneId,
    },

    /// Invalid harness configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A lane failed; the run was wound down and this is the first failure
    #[error("{0}")]
    StepFailed(Box<FailureRecord>),

    /// Internal synchronization failure (worker could not be spawned, died)
    #[error("synchronization failure: {0}")]
    Sync(String),
}

impl LockstepError {
    /// Whether this error was raised while building (never at run time)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LockstepError::NoSteps
                | LockstepError::UnevenSteps { .. }
                | LockstepError::OutOfTurn { .. }
                | LockstepError::InvalidConfig(_)
        )
    }

    /// The failure record, if a lane failed
    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            LockstepError::StepFailed(record) => Some(record),
            _ => None,
        }
    }

    /// Consume the error and return the failure record, if any
    pub fn into_failure(self) -> Option<FailureRecord> {
        match self {
            LockstepError::StepFailed(record) => Some(*record),
            _ => None,
        }
    }
}

impl From<FailureRecord> for LockstepError {
    fn from(record: FailureRecord) -> Self {
        LockstepError::StepFailed(Box::new(record))
    }
}
