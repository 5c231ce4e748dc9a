//! Ledger errors

use lockstep_core::StepError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors reported by the in-memory ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No account with this name
    #[error("account '{0}' not found")]
    AccountNotFound(String),

    /// `open_account` with a name that is already taken
    #[error("account '{0}' already exists")]
    AccountExists(String),

    /// A lock wait ran out of time
    #[error("lock on '{account}' not acquired within {timeout:?}")]
    LockTimeout {
        /// Contended account
        account: String,
        /// How long the session waited
        timeout: Duration,
    },

    /// A NOWAIT lock request found the row locked
    #[error("could not obtain lock on '{0}' (NOWAIT)")]
    LockNotAvailable(String),

    /// The transaction already committed or rolled back
    #[error("transaction {0} is not active")]
    TransactionNotActive(u64),

    /// A repeatable-read transaction tried to write a row changed by a
    /// concurrent committed transaction
    #[error("could not serialize access to '{0}' due to concurrent update")]
    SerializationFailure(String),

    /// Optimistic-lock update found a different row version
    #[error("row '{account}' was updated concurrently: expected version {expected}, found {actual}")]
    OptimisticConflict {
        /// Account being updated
        account: String,
        /// Version the caller read
        expected: u64,
        /// Version found at write time
        actual: u64,
    },

    /// A deposit would take the balance out of the `i64` range
    #[error("balance of '{account}' overflows when adding {amount}")]
    BalanceOverflow {
        /// Account being updated
        account: String,
        /// Rejected amount
        amount: i64,
    },

    /// Commit of a transaction marked rollback-only
    #[error("transaction {0} is marked rollback-only and was rolled back")]
    RollbackOnly(u64),
}

impl StorageError {
    /// Whether the error is a lock wait giving up
    pub fn is_lock_timeout(&self) -> bool {
        matches!(
            self,
            StorageError::LockTimeout { .. } | StorageError::LockNotAvailable(_)
        )
    }
}

impl From<StorageError> for StepError {
    fn from(e: StorageError) -> Self {
        if e.is_lock_timeout() {
            StepError::timed_out(e)
        } else {
            StepError::failed(e)
        }
    }
}
